//! Dual-authorization access broker
//!
//! A project may be touched only when both the service account and the
//! calling user can independently see it. The check runs in two stages:
//!
//! ```text
//! ServiceCheck ──ok──▶ UserCheck ──ok──▶ Authorized
//!      │                   │
//!      ├─ 404 ─▶ ResourceNotFound
//!      └─ else ─▶ ServiceAccessDenied
//!                          ├─ 404 ─▶ ResourceNotFound
//!                          └─ else ─▶ UserAccessDenied
//! ```
//!
//! The user stage is skipped entirely when the service stage fails. Every
//! operation after authorization goes through the service client; the
//! delegated client is only ever used to read the project.

use crate::auth::{Credential, Principal};
use crate::config::GitLabConfig;
use crate::error::{BrokerError, BrokerResult, GitLabResult};
use crate::gitlab::{
    GitLabClient, MergeRequest, MergeRequestFilter, Project, ProjectFilter, ResourceClient,
};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-call broker holding both credentials
pub struct AccessBroker {
    user: Box<dyn ResourceClient>,
    service: Arc<dyn ResourceClient>,
}

impl AccessBroker {
    pub fn new(user: Box<dyn ResourceClient>, service: Arc<dyn ResourceClient>) -> Self {
        Self { user, service }
    }

    /// Resolve a project with the service credential
    #[instrument(skip(self), fields(stage = "service"))]
    pub async fn resolve_project(&self, project: &str) -> BrokerResult<Project> {
        self.service.get_project(project).await.map_err(|e| {
            if e.is_not_found() {
                debug!("Project not found");
                BrokerError::ResourceNotFound {
                    project: project.to_string(),
                }
            } else {
                warn!(status = ?e.status(), "Service account cannot access project");
                BrokerError::ServiceAccessDenied {
                    project: project.to_string(),
                }
            }
        })
    }

    /// Confirm the calling user can see the project
    #[instrument(skip(self), fields(stage = "user"))]
    pub async fn resolve_project_as_user(&self, project: &str) -> BrokerResult<()> {
        match self.user.get_project(project).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Project not visible to user");
                Err(BrokerError::ResourceNotFound {
                    project: project.to_string(),
                })
            }
            Err(e) => {
                debug!(status = ?e.status(), "User cannot access project");
                Err(BrokerError::UserAccessDenied {
                    project: project.to_string(),
                })
            }
        }
    }

    /// Run both stages and hand back a service-bound project handle
    pub async fn authorize_project(&self, project: &str) -> BrokerResult<AuthorizedProject> {
        let resolved = self.resolve_project(project).await?;
        self.resolve_project_as_user(project).await?;

        debug!(project = %project, id = resolved.id, "Project authorized");
        Ok(AuthorizedProject {
            project: resolved,
            client: Arc::clone(&self.service),
        })
    }

    /// Projects visible to the service account
    pub fn list_projects(&self, filter: &ProjectFilter) -> BoxStream<'_, BrokerResult<Project>> {
        self.service
            .list_projects(filter)
            .map_err(BrokerError::from)
            .boxed()
    }

    /// Instance-wide merge request search as the service account
    pub fn list_merge_requests(
        &self,
        filter: &MergeRequestFilter,
    ) -> BoxStream<'_, BrokerResult<MergeRequest>> {
        self.service
            .list_merge_requests(filter)
            .map_err(BrokerError::from)
            .boxed()
    }
}

/// Project that passed both stages
///
/// Carries only the service client; endpoints are relative to the project.
#[derive(Clone)]
pub struct AuthorizedProject {
    project: Project,
    client: Arc<dyn ResourceClient>,
}

impl std::fmt::Debug for AuthorizedProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedProject")
            .field("project", &self.project)
            .finish()
    }
}

impl AuthorizedProject {
    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn id(&self) -> u64 {
        self.project.id
    }

    /// Absolute API endpoint for a project-relative path
    pub fn endpoint(&self, suffix: &str) -> String {
        format!("/projects/{}{}", self.project.id, suffix)
    }

    pub async fn get(&self, suffix: &str) -> GitLabResult<Value> {
        self.client.get_value(&self.endpoint(suffix)).await
    }

    pub fn paginate(&self, suffix: &str) -> BoxStream<'_, GitLabResult<Value>> {
        self.client.paginate_values(&self.endpoint(suffix))
    }

    pub async fn post(&self, suffix: &str, body: Option<&Value>) -> GitLabResult<Value> {
        self.client
            .send_value(Method::POST, &self.endpoint(suffix), body)
            .await
    }

    pub async fn put(&self, suffix: &str, body: Option<&Value>) -> GitLabResult<Value> {
        self.client
            .send_value(Method::PUT, &self.endpoint(suffix), body)
            .await
    }
}

/// Process-wide factory for per-call brokers
pub struct BrokerProvider {
    service: Arc<dyn ResourceClient>,
    http: reqwest::Client,
    gitlab: GitLabConfig,
}

impl BrokerProvider {
    pub fn new(service: Arc<dyn ResourceClient>, http: reqwest::Client, gitlab: GitLabConfig) -> Self {
        Self {
            service,
            http,
            gitlab,
        }
    }

    /// Fresh broker bound to the caller's token
    pub fn broker_for(&self, principal: &Principal) -> BrokerResult<AccessBroker> {
        let credential = Credential::delegated(principal.token.clone())
            .map_err(|_| BrokerError::InvalidCredential)?;
        let user = GitLabClient::new(self.http.clone(), &self.gitlab, credential);
        Ok(AccessBroker::new(Box::new(user), Arc::clone(&self.service)))
    }
}
