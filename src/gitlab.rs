//! GitLab REST v4 client for the source side of the mirror.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;
use crate::directory::{RepositoryRecord, SourceDirectory, Visibility, PAGE_SIZE};
use crate::error::DirectoryError;

/// Project as returned by `/groups/:id/projects` and `/projects/:id`
#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    path: String,
    path_with_namespace: String,
    #[serde(default)]
    namespace: Option<GitLabNamespace>,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitLabNamespace {
    full_path: String,
}

impl From<GitLabProject> for RepositoryRecord {
    fn from(project: GitLabProject) -> Self {
        let namespace = match project.namespace {
            Some(ns) => ns.full_path,
            None => project
                .path_with_namespace
                .rsplit_once('/')
                .map(|(ns, _)| ns.to_string())
                .unwrap_or_default(),
        };

        RepositoryRecord {
            id: project.id,
            name: project.name,
            namespace,
            description: project.description.unwrap_or_default(),
            path: project.path,
            path_with_namespace: project.path_with_namespace,
            visibility: project.visibility,
            created_at: project.created_at,
            last_activity_at: project.last_activity_at,
        }
    }
}

/// GitLab client wrapper
pub struct GitLabClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(config: &SourceConfig, user_agent: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        let base_url = Url::parse(&config.url)
            .map_err(|e| DirectoryError::Transport(format!("invalid GitLab URL {}: {}", config.url, e)))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// Build `<base>/api/v4/<segments...>`, percent-encoding each segment so
    /// nested group paths like `acme/tools` become a single `acme%2Ftools`.
    fn api_url(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| DirectoryError::Transport(format!("GitLab URL cannot be a base: {}", self.base_url)))?;
            path.pop_if_empty().push("api").push("v4");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, DirectoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SourceDirectory for GitLabClient {
    async fn list_public_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> Result<Vec<RepositoryRecord>, DirectoryError> {
        let url = self.api_url(&["groups", org, "projects"])?;
        debug!("Listing GitLab projects for {} page {}", org, page);

        let request = self.client.get(url).query(&[
            ("visibility", "public".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let projects: Vec<GitLabProject> = response.json().await?;

        Ok(projects.into_iter().map(RepositoryRecord::from).collect())
    }

    async fn get_repository(&self, id: u64) -> Result<RepositoryRecord, DirectoryError> {
        let url = self.api_url(&["projects", &id.to_string()])?;
        debug!("Fetching GitLab project {}", id);

        let response = Self::check(self.authorize(self.client.get(url)).send().await?).await?;
        let project: GitLabProject = response.json().await?;

        Ok(project.into())
    }

    fn provider_name(&self) -> &'static str {
        "GitLab"
    }
}
