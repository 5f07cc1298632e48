//! Mirror operations shared by the full sync and the webhook dispatcher.
//!
//! Every operation holds a per-name lock for its whole duration, so two
//! events for the same repository never interleave their API calls and
//! pushes. Operations on different names run in parallel.
//!
//! `create` and `update` re-read the source record once they hold the lock.
//! A repository that stopped being public in the meantime is withdrawn from
//! the mirror instead, whatever listing or event the caller started from.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::directory::{MirrorDirectory, RepositoryRecord, SourceDirectory};
use crate::error::{DirectoryError, MirrorError, Result};
use crate::git::{StorageLayout, Transport};
use crate::mirror_set::MirrorSet;

/// What a create or update ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The mirror exists and carries the current metadata and refs
    Mirrored,
    /// The source is no longer public, so the mirror was removed
    Withdrawn,
}

pub struct Mirror {
    source: Arc<dyn SourceDirectory>,
    target: Arc<dyn MirrorDirectory>,
    transport: Arc<dyn Transport>,
    mirrors: Arc<MirrorSet>,
    layout: StorageLayout,
    homepage_base: String,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Mirror {
    pub fn new(
        source: Arc<dyn SourceDirectory>,
        target: Arc<dyn MirrorDirectory>,
        transport: Arc<dyn Transport>,
        mirrors: Arc<MirrorSet>,
        layout: StorageLayout,
        homepage_base: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            transport,
            mirrors,
            layout,
            homepage_base: homepage_base.into().trim_end_matches('/').to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &dyn SourceDirectory {
        self.source.as_ref()
    }

    pub fn target(&self) -> &dyn MirrorDirectory {
        self.target.as_ref()
    }

    pub fn mirrors(&self) -> &MirrorSet {
        &self.mirrors
    }

    /// Run `operation` while holding the lock for `name`
    async fn with_lock<T>(&self, name: &str, operation: impl Future<Output = T>) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            operation.await
        };

        // Clones are only handed out under the table lock, so a count of two
        // (the table and us) means nobody else is waiting on this name
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 && locks.get(name).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(name);
        }

        result
    }

    fn homepage(&self, repo: &RepositoryRecord) -> String {
        format!("{}/{}", self.homepage_base, repo.path_with_namespace)
    }

    fn local_path(&self, repo: &RepositoryRecord) -> Result<PathBuf> {
        Ok(self.layout.repo_path(repo.id, &repo.path_with_namespace)?)
    }

    /// Latest record for `id` from the source service
    pub async fn fetch(&self, id: u64) -> Result<RepositoryRecord> {
        Ok(self.source.get_repository(id).await?)
    }

    /// Whether the local copy of `repo` has any commit. Unaddressable
    /// repositories count as empty.
    pub async fn has_commits(&self, repo: &RepositoryRecord) -> bool {
        match self.layout.repo_path(repo.id, &repo.path_with_namespace) {
            Ok(path) => self.transport.has_commits(&path).await,
            Err(e) => {
                warn!(repo = %repo.name, "Cannot locate repository: {}", e);
                false
            }
        }
    }

    /// Create the mirror, push if there is anything to push, then record it.
    /// A name collision is handled as an update so replays are harmless.
    pub async fn create(&self, repo: &RepositoryRecord) -> Result<Applied> {
        self.with_lock(&repo.name, self.create_locked(repo)).await
    }

    /// Refresh mirror metadata and push all refs
    pub async fn update(&self, repo: &RepositoryRecord) -> Result<Applied> {
        self.with_lock(&repo.name, self.update_locked(repo)).await
    }

    /// Delete the mirror. The name leaves the set only once the delete succeeded.
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.with_lock(name, self.remove_locked(name)).await
    }

    /// Push all refs without touching metadata
    pub async fn push(&self, repo: &RepositoryRecord) -> Result<()> {
        self.with_lock(&repo.name, self.push_locked(repo)).await
    }

    /// Current source record for `repo`, or `None` once it is not public
    async fn refresh_locked(&self, repo: &RepositoryRecord) -> Result<Option<RepositoryRecord>> {
        let current = self.fetch(repo.id).await?;
        if current.name != repo.name {
            return Err(MirrorError::Renamed {
                expected: repo.name.clone(),
                found: current.name,
            });
        }
        if !current.visibility.is_public() {
            warn!(repo = %repo.name, visibility = %current.visibility, "Repository is no longer public, withdrawing mirror");
            return Ok(None);
        }
        Ok(Some(current))
    }

    async fn create_locked(&self, repo: &RepositoryRecord) -> Result<Applied> {
        let Some(repo) = self.refresh_locked(repo).await? else {
            self.remove_locked(&repo.name).await?;
            return Ok(Applied::Withdrawn);
        };

        let homepage = self.homepage(&repo);
        match self
            .target
            .create_repository(&repo.name, &repo.description, &homepage)
            .await
        {
            Ok(_) => info!(repo = %repo.name, "Created mirror repository"),
            Err(DirectoryError::AlreadyExists(_)) => {
                warn!(repo = %repo.name, "Mirror repository already exists, updating instead");
                self.target
                    .update_repository(&repo.name, &repo.description)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.push_if_any(&repo).await?;
        self.mirrors.add(&repo.name);
        Ok(Applied::Mirrored)
    }

    async fn update_locked(&self, repo: &RepositoryRecord) -> Result<Applied> {
        let Some(repo) = self.refresh_locked(repo).await? else {
            self.remove_locked(&repo.name).await?;
            return Ok(Applied::Withdrawn);
        };

        self.target
            .update_repository(&repo.name, &repo.description)
            .await?;
        self.push_if_any(&repo).await?;

        self.mirrors.add(&repo.name);
        info!(repo = %repo.name, "Updated mirror repository");
        Ok(Applied::Mirrored)
    }

    async fn remove_locked(&self, name: &str) -> Result<()> {
        self.target.delete_repository(name).await?;
        self.mirrors.delete(name);
        info!(repo = %name, "Removed mirror repository");
        Ok(())
    }

    async fn push_if_any(&self, repo: &RepositoryRecord) -> Result<()> {
        if self.has_commits(repo).await {
            self.push_locked(repo).await
        } else {
            debug!(repo = %repo.name, "Repository has no commits yet, nothing to push");
            Ok(())
        }
    }

    async fn push_locked(&self, repo: &RepositoryRecord) -> Result<()> {
        let path = self.local_path(repo)?;
        let url = self.target.push_url(&repo.name);
        self.transport.push_mirror(&path, &url).await?;
        debug!(repo = %repo.name, "Pushed {}", path.display());
        Ok(())
    }
}
