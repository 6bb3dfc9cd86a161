//! Resource client seam
//!
//! The broker talks to GitLab only through this trait so each stage of the
//! authorization check can be exercised against a fake.

use super::client::GitLabClient;
use super::types::{MergeRequest, MergeRequestFilter, Project, ProjectFilter};
use crate::auth::CredentialKind;
use crate::error::GitLabResult;
use crate::util::QueryBuilder;
// async_trait required for dyn-compatibility with Arc<dyn ResourceClient>
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::Value;

/// GitLab operations available to the broker
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch a project by numeric id or `group/path`
    async fn get_project(&self, project: &str) -> GitLabResult<Project>;

    /// Projects visible to this credential
    fn list_projects(&self, filter: &ProjectFilter) -> BoxStream<'_, GitLabResult<Project>>;

    /// Merge requests across the instance visible to this credential
    fn list_merge_requests(
        &self,
        filter: &MergeRequestFilter,
    ) -> BoxStream<'_, GitLabResult<MergeRequest>>;

    /// GET an arbitrary endpoint (relative to the API root)
    async fn get_value(&self, endpoint: &str) -> GitLabResult<Value>;

    /// Walk a paginated endpoint
    fn paginate_values(&self, endpoint: &str) -> BoxStream<'_, GitLabResult<Value>>;

    /// Send a request with an optional JSON body
    async fn send_value(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> GitLabResult<Value>;

    fn credential_kind(&self) -> CredentialKind;
}

pub(crate) fn projects_endpoint(filter: &ProjectFilter) -> String {
    let query = QueryBuilder::new()
        .optional("search", filter.search.as_ref())
        .optional("owned", filter.owned)
        .optional("membership", filter.membership)
        .build();
    format!("/projects{}", query)
}

pub(crate) fn merge_requests_endpoint(filter: &MergeRequestFilter) -> String {
    let query = QueryBuilder::new()
        .optional("state", filter.state.as_ref())
        .param("scope", filter.scope.as_deref().unwrap_or("all"))
        .optional("wip", filter.wip.as_ref())
        .optional("author_username", filter.author_username.as_ref())
        .optional("assignee_username", filter.assignee_username.as_ref())
        .optional("search", filter.search.as_ref())
        .optional("created_after", filter.created_after.as_ref())
        .optional("created_before", filter.created_before.as_ref())
        .optional("updated_after", filter.updated_after.as_ref())
        .optional("updated_before", filter.updated_before.as_ref())
        .build();
    format!("/merge_requests{}", query)
}

#[async_trait]
impl ResourceClient for GitLabClient {
    async fn get_project(&self, project: &str) -> GitLabResult<Project> {
        self.get(&format!("/projects/{}", GitLabClient::encode_project(project)))
            .await
    }

    fn list_projects(&self, filter: &ProjectFilter) -> BoxStream<'_, GitLabResult<Project>> {
        self.paginate(&projects_endpoint(filter))
    }

    fn list_merge_requests(
        &self,
        filter: &MergeRequestFilter,
    ) -> BoxStream<'_, GitLabResult<MergeRequest>> {
        self.paginate(&merge_requests_endpoint(filter))
    }

    async fn get_value(&self, endpoint: &str) -> GitLabResult<Value> {
        self.get_json(endpoint).await
    }

    fn paginate_values(&self, endpoint: &str) -> BoxStream<'_, GitLabResult<Value>> {
        self.paginate(endpoint)
    }

    async fn send_value(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> GitLabResult<Value> {
        self.request_json(method, endpoint, body).await
    }

    fn credential_kind(&self) -> CredentialKind {
        GitLabClient::credential_kind(self)
    }
}
