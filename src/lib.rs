//! repomirror - keeps a public GitHub organization in sync with a GitLab group
//!
//! A full sync at startup (and periodically afterwards) reconciles both
//! listings with a sorted merge-join; between syncs, GitLab system hooks drive
//! an incremental state machine. Both paths maintain the shared [`MirrorSet`].
//!
//! ## Modules
//!
//! - [`mirror_set`]: the set of currently mirrored repository names
//! - [`directory`]: record types and the source/mirror directory traits
//! - [`gitlab`] / [`github`]: the two directory clients
//! - [`git`]: `git push --mirror` and the on-disk storage layout
//! - [`mirror`]: create/update/remove/push, serialized per repository
//! - [`sync`]: full sync
//! - [`webhook`]: webhook endpoint, event model and dispatcher
//! - [`daemon`]: the long-running service

pub mod config;
pub mod daemon;
pub mod directory;
pub mod error;
pub mod git;
pub mod github;
pub mod gitlab;
pub mod health;
pub mod mirror;
pub mod mirror_set;
pub mod sync;
pub mod webhook;

pub use config::Config;
pub use daemon::Daemon;
pub use directory::{MirrorDirectory, MirrorRecord, RepositoryRecord, SourceDirectory, Visibility};
pub use error::{DirectoryError, GitError, HookError, MirrorError};
pub use git::{GitClient, StorageLayout, Transport};
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use health::HealthCheck;
pub use mirror::{Applied, Mirror};
pub use mirror_set::MirrorSet;
pub use sync::{SyncEngine, SyncSummary};
pub use webhook::{Dispatcher, Event, Outcome};
