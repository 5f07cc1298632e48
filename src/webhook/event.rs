//! Typed webhook events.
//!
//! The `X-Gitlab-Event` header selects the schema ([`EventKind`]); system
//! hooks are further tagged by `event_name` in the body.

use serde::Deserialize;

use crate::directory::{NamespacePath, RepositoryRecord, Visibility};

/// Decode schemas, keyed by the `X-Gitlab-Event` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SystemHook,
    PushHook,
    TagPushHook,
}

impl EventKind {
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "System Hook" => Some(EventKind::SystemHook),
            "Push Hook" => Some(EventKind::PushHook),
            "Tag Push Hook" => Some(EventKind::TagPushHook),
            _ => None,
        }
    }

    pub fn decode(self, body: &[u8]) -> Result<Event, serde_json::Error> {
        match self {
            EventKind::SystemHook => serde_json::from_slice(body),
            EventKind::PushHook | EventKind::TagPushHook => {
                let hook: ProjectPushHook = serde_json::from_slice(body)?;
                Ok(Event::RepositoryUpdate(hook.into()))
            }
        }
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event_name", rename_all = "snake_case")]
pub enum Event {
    ProjectCreate(ProjectEvent),
    ProjectDestroy(ProjectEvent),
    ProjectRename(ProjectMoveEvent),
    ProjectTransfer(ProjectMoveEvent),
    ProjectUpdate(ProjectEvent),
    RepositoryUpdate(PushEvent),
    /// Any other system hook (user_create, group events, ...)
    #[serde(other)]
    Ignored,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ProjectCreate(_) => "project_create",
            Event::ProjectDestroy(_) => "project_destroy",
            Event::ProjectRename(_) => "project_rename",
            Event::ProjectTransfer(_) => "project_transfer",
            Event::ProjectUpdate(_) => "project_update",
            Event::RepositoryUpdate(_) => "repository_update",
            Event::Ignored => "ignored",
        }
    }
}

/// Payload of `project_create`, `project_destroy` and `project_update`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectEvent {
    pub project_id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub project_visibility: Visibility,
}

impl ProjectEvent {
    pub fn namespace(&self) -> Option<&str> {
        NamespacePath::derive(&self.path_with_namespace, &self.path).map(|ns| ns.namespace)
    }
}

/// Payload of `project_rename` and `project_transfer`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectMoveEvent {
    pub project_id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub old_path_with_namespace: String,
    #[serde(default)]
    pub project_visibility: Visibility,
}

impl ProjectMoveEvent {
    /// Namespace after the move
    pub fn namespace(&self) -> Option<&str> {
        NamespacePath::derive(&self.path_with_namespace, &self.path).map(|ns| ns.namespace)
    }

    /// Namespace before the move; only the full old path is known
    pub fn old_namespace(&self) -> Option<&str> {
        NamespacePath::split(&self.old_path_with_namespace).map(|ns| ns.namespace)
    }

    pub fn as_project(&self) -> ProjectEvent {
        ProjectEvent {
            project_id: self.project_id,
            name: self.name.clone(),
            path: self.path.clone(),
            path_with_namespace: self.path_with_namespace.clone(),
            project_visibility: self.project_visibility,
        }
    }
}

/// Refs pushed to a repository (`repository_update`, `Push Hook`, `Tag Push Hook`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    pub project_id: u64,
    pub project: PushProject,
    #[serde(default)]
    pub changes: Vec<RefChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub path_with_namespace: String,
    #[serde(default)]
    pub visibility_level: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefChange {
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl PushEvent {
    pub fn namespace(&self) -> Option<&str> {
        NamespacePath::split(&self.project.path_with_namespace).map(|ns| ns.namespace)
    }

    /// Enough of a repository record to locate and push it
    pub fn record(&self) -> Option<RepositoryRecord> {
        let split = NamespacePath::split(&self.project.path_with_namespace)?;
        Some(RepositoryRecord {
            id: self.project_id,
            name: self.project.name.clone(),
            namespace: split.namespace.to_string(),
            description: self.project.description.clone().unwrap_or_default(),
            path: split.path.to_string(),
            path_with_namespace: self.project.path_with_namespace.clone(),
            visibility: self.project.visibility_level,
            created_at: None,
            last_activity_at: None,
        })
    }
}

/// Project-level push payload: a single top-level `ref` instead of `changes`
#[derive(Debug, Deserialize)]
struct ProjectPushHook {
    project_id: u64,
    project: PushProject,
    #[serde(rename = "ref")]
    git_ref: String,
}

impl From<ProjectPushHook> for PushEvent {
    fn from(hook: ProjectPushHook) -> Self {
        PushEvent {
            project_id: hook.project_id,
            project: hook.project,
            changes: vec![RefChange {
                git_ref: hook.git_ref,
            }],
        }
    }
}
