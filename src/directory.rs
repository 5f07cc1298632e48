//! Repository directory abstraction layer
//!
//! Provider-agnostic records for both sides of the mirror and the traits the
//! reconciler and webhook dispatcher use to read and mutate them. The GitLab
//! and GitHub clients implement these; tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::DirectoryError;

/// Page size used for every listing call on both services.
pub const PAGE_SIZE: u8 = 100;

/// Hard stop for runaway pagination
const MAX_PAGES: u32 = 1000;

/// Repository visibility on the source service.
///
/// The discriminants follow GitLab's `visibility_level`, so the derived
/// ordering matches the service's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawVisibility", into = "String")]
pub enum Visibility {
    #[default]
    Private = 0,
    Internal = 10,
    Public = 20,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Internal => "internal",
            Visibility::Public => "public",
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u64) -> Option<Self> {
        match level {
            0 => Some(Visibility::Private),
            10 => Some(Visibility::Internal),
            20 => Some(Visibility::Public),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Visibility::Private),
            "internal" => Some(Visibility::Internal),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Visibility> for String {
    fn from(v: Visibility) -> Self {
        v.as_str().to_string()
    }
}

/// Wire form: hooks send either `"public"` or `20` depending on the event.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVisibility {
    Level(u64),
    Name(String),
}

impl TryFrom<RawVisibility> for Visibility {
    type Error = String;

    fn try_from(raw: RawVisibility) -> Result<Self, Self::Error> {
        match raw {
            RawVisibility::Level(level) => Visibility::from_level(level)
                .ok_or_else(|| format!("unknown visibility level {}", level)),
            RawVisibility::Name(name) => {
                Visibility::parse(&name).ok_or_else(|| format!("unknown visibility {:?}", name))
            }
        }
    }
}

/// A `path_with_namespace` split into owning namespace and repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePath<'a> {
    pub namespace: &'a str,
    pub path: &'a str,
}

impl<'a> NamespacePath<'a> {
    /// Derive the namespace by removing exactly `"/" + path` from the end.
    ///
    /// Returns `None` when `path_with_namespace` does not end with that
    /// suffix (for instance a payload that already carries a renamed path),
    /// rather than guessing where the namespace ends.
    pub fn derive(path_with_namespace: &'a str, path: &'a str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        let namespace = path_with_namespace
            .strip_suffix(path)?
            .strip_suffix('/')?;
        if namespace.is_empty() {
            return None;
        }
        Some(Self { namespace, path })
    }

    /// Split on the last `/` when the path segment is not known separately.
    pub fn split(path_with_namespace: &'a str) -> Option<Self> {
        let (namespace, path) = path_with_namespace.rsplit_once('/')?;
        if namespace.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self { namespace, path })
    }

    /// The top-level organization (first segment of the namespace)
    pub fn organization(&self) -> &'a str {
        self.namespace.split('/').next().unwrap_or(self.namespace)
    }
}

/// Source-side repository metadata. Owned by the source service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Opaque identifier, stable across renames and transfers
    pub id: u64,

    /// Display name, also used as the mirror repository name
    pub name: String,

    /// Full path of the owning namespace
    pub namespace: String,

    #[serde(default)]
    pub description: String,

    /// On-disk path segment
    pub path: String,

    pub path_with_namespace: String,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl RepositoryRecord {
    /// Owning namespace derived from `path_with_namespace` and `path`
    pub fn owning_namespace(&self) -> Option<&str> {
        NamespacePath::derive(&self.path_with_namespace, &self.path).map(|ns| ns.namespace)
    }

    /// Whether this repository lives directly in `organization`
    pub fn belongs_to(&self, organization: &str) -> bool {
        self.owning_namespace() == Some(organization)
    }
}

/// Mirror-side repository metadata. GitHub addresses repositories by
/// `org/name`, so the name is also the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// Read access to the authoritative source service.
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    /// One page (1-based) of public repositories in `org`
    async fn list_public_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> Result<Vec<RepositoryRecord>, DirectoryError>;

    /// Full record for a single repository
    async fn get_repository(&self, id: u64) -> Result<RepositoryRecord, DirectoryError>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}

/// Read/write access to the mirror service.
#[async_trait]
pub trait MirrorDirectory: Send + Sync {
    /// One page (1-based) of repositories in `org`
    async fn list_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> Result<Vec<MirrorRecord>, DirectoryError>;

    /// Create a repository. A name collision must surface as
    /// [`DirectoryError::AlreadyExists`].
    async fn create_repository(
        &self,
        name: &str,
        description: &str,
        homepage: &str,
    ) -> Result<MirrorRecord, DirectoryError>;

    async fn update_repository(&self, name: &str, description: &str) -> Result<(), DirectoryError>;

    async fn delete_repository(&self, name: &str) -> Result<(), DirectoryError>;

    /// Authenticated URL the transport pushes to
    fn push_url(&self, name: &str) -> String;

    /// Credential embedded in [`MirrorDirectory::push_url`], redacted from logs
    fn credential(&self) -> Option<&str> {
        None
    }

    fn provider_name(&self) -> &'static str;
}

/// Concatenate pages from `fetch` until one comes back shorter than
/// [`PAGE_SIZE`].
pub async fn collect_pages<T, F, Fut>(what: &str, mut fetch: F) -> Result<Vec<T>, DirectoryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, DirectoryError>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let batch = fetch(page).await?;
        let short = batch.len() < usize::from(PAGE_SIZE);
        debug!("Fetched {} {} from page {}", batch.len(), what, page);
        items.extend(batch);

        if short {
            break;
        }
        if page >= MAX_PAGES {
            warn!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, what);
            break;
        }
        page += 1;
    }

    Ok(items)
}
