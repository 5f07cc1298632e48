//! Incremental state machine driven by webhook events.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::event::{Event, ProjectEvent, ProjectMoveEvent, PushEvent};
use crate::error::Result;
use crate::mirror::{Applied, Mirror};

/// What a single event led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(String),
    Updated(String),
    Removed(String),
    Pushed(String),
    Ignored(String),
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created(name) => write!(f, "created {}", name),
            Outcome::Updated(name) => write!(f, "updated {}", name),
            Outcome::Removed(name) => write!(f, "removed {}", name),
            Outcome::Pushed(name) => write!(f, "pushed {}", name),
            Outcome::Ignored(reason) => write!(f, "ignored: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

fn ignored(reason: impl Into<String>) -> Outcome {
    Outcome::Ignored(reason.into())
}

pub struct Dispatcher {
    mirror: Arc<Mirror>,
    organization: String,
}

impl Dispatcher {
    pub fn new(mirror: Arc<Mirror>, organization: impl Into<String>) -> Self {
        Self {
            mirror,
            organization: organization.into(),
        }
    }

    /// Apply one event. Failures are logged and reported in the outcome;
    /// the mirror set reflects only the steps that succeeded.
    pub async fn dispatch(&self, event: Event) -> Outcome {
        let kind = event.name();
        let result = match event {
            Event::ProjectCreate(project) => self.project_create(&project).await,
            Event::ProjectDestroy(project) => self.project_destroy(&project).await,
            Event::ProjectTransfer(moved) => self.project_transfer(&moved).await,
            Event::ProjectRename(moved) => self.project_update(&moved.as_project()).await,
            Event::ProjectUpdate(project) => self.project_update(&project).await,
            Event::RepositoryUpdate(push) => self.repository_update(&push).await,
            Event::Ignored => Ok(ignored("unhandled event")),
        };

        match result {
            Ok(outcome) => {
                info!(event = kind, "{}", outcome);
                outcome
            }
            Err(e) => {
                error!(event = kind, "Failed to handle event: {}", e);
                Outcome::Failed(e.to_string())
            }
        }
    }

    fn in_organization(&self, namespace: Option<&str>) -> bool {
        namespace == Some(self.organization.as_str())
    }

    /// Fetch the authoritative record and create its mirror. A record that
    /// is no longer public has any existing mirror removed instead.
    async fn create(&self, project_id: u64) -> Result<Outcome> {
        let repo = self.mirror.fetch(project_id).await?;
        Ok(match self.mirror.create(&repo).await? {
            Applied::Mirrored => Outcome::Created(repo.name),
            Applied::Withdrawn => Outcome::Removed(repo.name),
        })
    }

    async fn destroy(&self, name: &str) -> Result<Outcome> {
        self.mirror.remove(name).await?;
        Ok(Outcome::Removed(name.to_string()))
    }

    async fn project_create(&self, project: &ProjectEvent) -> Result<Outcome> {
        if !self.in_organization(project.namespace()) {
            return Ok(ignored(format!("{} is outside the organization", project.path_with_namespace)));
        }
        if !project.project_visibility.is_public() {
            return Ok(ignored(format!("{} is not public", project.name)));
        }
        self.create(project.project_id).await
    }

    async fn project_destroy(&self, project: &ProjectEvent) -> Result<Outcome> {
        if !self.in_organization(project.namespace()) {
            return Ok(ignored(format!("{} is outside the organization", project.path_with_namespace)));
        }
        // Membership is no guide here: a full sync may be rebuilding the set,
        // and deleting a mirror that does not exist succeeds
        self.destroy(&project.name).await
    }

    async fn project_transfer(&self, moved: &ProjectMoveEvent) -> Result<Outcome> {
        if !moved.project_visibility.is_public() {
            return Ok(ignored(format!("{} is not public", moved.name)));
        }

        let new_namespace = moved.namespace();
        let old_namespace = moved.old_namespace();
        if new_namespace == old_namespace {
            return Ok(ignored("namespace unchanged"));
        }

        if self.in_organization(new_namespace) {
            self.create(moved.project_id).await
        } else if self.in_organization(old_namespace) {
            self.destroy(&moved.name).await
        } else {
            Ok(ignored(format!("{} moved outside the organization", moved.name)))
        }
    }

    /// Shared by `project_update` and `project_rename`
    async fn project_update(&self, project: &ProjectEvent) -> Result<Outcome> {
        if !self.in_organization(project.namespace()) {
            return Ok(ignored(format!("{} is outside the organization", project.path_with_namespace)));
        }

        let mirrored = self.mirror.mirrors().contains(&project.name);
        let public = project.project_visibility.is_public();

        match (mirrored, public) {
            (true, false) => {
                warn!(repo = %project.name, "Repository is no longer public, removing mirror");
                self.destroy(&project.name).await
            }
            (true, true) => {
                let repo = self.mirror.fetch(project.project_id).await?;
                Ok(match self.mirror.update(&repo).await? {
                    Applied::Mirrored => Outcome::Updated(repo.name),
                    Applied::Withdrawn => Outcome::Removed(repo.name),
                })
            }
            (false, true) => self.create(project.project_id).await,
            // Absent from the set while a full sync rebuilds it does not mean
            // absent from the mirror
            (false, false) => self.destroy(&project.name).await,
        }
    }

    async fn repository_update(&self, push: &PushEvent) -> Result<Outcome> {
        if !self.in_organization(push.namespace()) {
            return Ok(ignored(format!(
                "{} is outside the organization",
                push.project.path_with_namespace
            )));
        }
        if !push.project.visibility_level.is_public() {
            return Ok(ignored(format!("{} is not public", push.project.name)));
        }
        if push.changes.is_empty() {
            return Ok(ignored("no ref changes"));
        }

        if self.mirror.mirrors().contains(&push.project.name) {
            let Some(repo) = push.record() else {
                return Ok(ignored("unaddressable repository"));
            };
            self.mirror.push(&repo).await?;
            Ok(Outcome::Pushed(repo.name))
        } else {
            self.create(push.project_id).await
        }
    }
}
