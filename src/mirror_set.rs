//! The set of repositories currently believed to be mirrored.
//!
//! A name is present iff a matching repository exists on the mirror side and
//! is up to date modulo a pending push. The reconciler rebuilds the set on
//! every full sync while webhook handlers mutate it concurrently, so every
//! access goes through one `RwLock`.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct MirrorSet {
    names: RwLock<HashSet<String>>,
}

impl MirrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all membership. Only used at the start of a full sync.
    pub fn reset(&self) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        names.clear();
    }

    pub fn add(&self, name: &str) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        names.insert(name.to_string());
    }

    pub fn delete(&self, name: &str) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        names.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of the current members
    pub fn names(&self) -> Vec<String> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<String> = names.iter().cloned().collect();
        snapshot.sort();
        snapshot
    }
}
