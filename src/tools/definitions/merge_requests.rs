//! Merge Request tools
//!
//! Reading, discussing, creating, approving and merging merge requests.
//! Mutations are performed by the service account once the project passed
//! the dual check.

use crate::error::ToolResult;
use crate::gitlab::{
    ActionResult, Commit, Discussion, MergeRequest, MergeRequestChanges, MergeRequestDetails,
    MergeRequestFilter, Note, Pipeline,
};
use crate::tools::executor::{ToolContext, ToolExecutor, ToolOutput, collect_records, record};
use crate::tools::{ToolRegistry, gitlab_tool};
use crate::util::QueryBuilder;
use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value, json};

/// Register all merge request tools
pub fn register(registry: &mut ToolRegistry) {
    registry.register::<SearchMergeRequests>();
    registry.register::<ListMergeRequests>();
    registry.register::<GetMergeRequest>();
    registry.register::<GetMergeRequestChanges>();
    registry.register::<GetMrCommits>();
    registry.register::<GetMrPipelines>();
    registry.register::<GetMrDiscussions>();
    registry.register::<AddMrDiscussion>();
    registry.register::<AddMergeRequestComment>();
    registry.register::<CreateMergeRequest>();
    registry.register::<ApproveMergeRequest>();
    registry.register::<UnapproveMergeRequest>();
    registry.register::<MergeMergeRequest>();
}

fn mr_path(iid: u64, suffix: &str) -> String {
    format!("/merge_requests/{}{}", iid, suffix)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

// ============================================================================
// search_merge_requests
// ============================================================================

fn default_scope() -> String {
    "all".to_string()
}

/// Search merge requests across all projects
#[gitlab_tool(
    name = "search_merge_requests",
    description = "Search merge requests across every project the automation account can see",
    category = "merge_requests",
    operation = "read"
)]
pub struct SearchMergeRequests {
    /// Filter by state: opened, closed, locked, merged
    #[serde(default)]
    pub state: Option<String>,
    /// Scope: all, created_by_me, assigned_to_me
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Filter by draft status: yes or no
    #[serde(default)]
    pub wip: Option<String>,
    /// Filter by author username
    #[serde(default)]
    pub author_username: Option<String>,
    /// Filter by assignee username
    #[serde(default)]
    pub assignee_username: Option<String>,
    /// Search in title and description
    #[serde(default)]
    pub search: Option<String>,
    /// Created after (ISO 8601)
    #[serde(default)]
    pub created_after: Option<String>,
    /// Created before (ISO 8601)
    #[serde(default)]
    pub created_before: Option<String>,
    /// Updated after (ISO 8601)
    #[serde(default)]
    pub updated_after: Option<String>,
    /// Updated before (ISO 8601)
    #[serde(default)]
    pub updated_before: Option<String>,
}

#[async_trait]
impl ToolExecutor for SearchMergeRequests {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let filter = MergeRequestFilter {
            state: non_empty(&self.state),
            scope: Some(self.scope.clone()),
            wip: non_empty(&self.wip),
            author_username: non_empty(&self.author_username),
            assignee_username: non_empty(&self.assignee_username),
            search: non_empty(&self.search),
            created_after: non_empty(&self.created_after),
            created_before: non_empty(&self.created_before),
            updated_after: non_empty(&self.updated_after),
            updated_before: non_empty(&self.updated_before),
        };

        let mrs: Vec<MergeRequest> = ctx.broker.list_merge_requests(&filter).try_collect().await?;
        ToolOutput::json(&mrs)
    }
}

// ============================================================================
// list_merge_requests
// ============================================================================

/// List merge requests in a project
#[gitlab_tool(
    name = "list_merge_requests",
    description = "List merge requests in a GitLab project with optional filtering",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct ListMergeRequests {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Filter by state: opened, closed, locked, merged
    #[serde(default)]
    pub state: Option<String>,
    /// Filter by author username
    #[serde(default)]
    pub author_username: Option<String>,
    /// Filter by assignee username
    #[serde(default)]
    pub assignee_username: Option<String>,
}

#[async_trait]
impl ToolExecutor for ListMergeRequests {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let query = QueryBuilder::new()
            .optional("state", non_empty(&self.state))
            .optional("author_username", non_empty(&self.author_username))
            .optional("assignee_username", non_empty(&self.assignee_username))
            .build();

        let project = ctx.project()?;
        let mrs: Vec<MergeRequest> =
            collect_records(project.paginate(&format!("/merge_requests{}", query))).await?;
        ToolOutput::json(&mrs)
    }
}

// ============================================================================
// get_merge_request
// ============================================================================

/// Get details of a specific merge request
#[gitlab_tool(
    name = "get_merge_request",
    description = "Get a merge request with its review state",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetMergeRequest {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for GetMergeRequest {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let raw = ctx.project()?.get(&mr_path(self.mr_iid, "")).await?;
        let mr: MergeRequestDetails = record(raw)?;
        ToolOutput::json(&mr)
    }
}

/// Get merge request diffs
#[gitlab_tool(
    name = "get_merge_request_changes",
    description = "Get the file changes (diffs) of a merge request",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetMergeRequestChanges {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for GetMergeRequestChanges {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let raw = ctx
            .project()?
            .get(&mr_path(self.mr_iid, "/changes"))
            .await?;
        let changes: MergeRequestChanges = record(raw)?;
        ToolOutput::json(&changes)
    }
}

/// List commits of a merge request
#[gitlab_tool(
    name = "get_mr_commits",
    description = "List the commits of a merge request",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetMrCommits {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for GetMrCommits {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let project = ctx.project()?;
        let commits: Vec<Commit> =
            collect_records(project.paginate(&mr_path(self.mr_iid, "/commits"))).await?;
        ToolOutput::json(&commits)
    }
}

/// List pipelines of a merge request
#[gitlab_tool(
    name = "get_mr_pipelines",
    description = "List the pipelines run for a merge request",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetMrPipelines {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for GetMrPipelines {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let project = ctx.project()?;
        let pipelines: Vec<Pipeline> =
            collect_records(project.paginate(&mr_path(self.mr_iid, "/pipelines"))).await?;
        ToolOutput::json(&pipelines)
    }
}

// ============================================================================
// discussions and notes
// ============================================================================

/// List discussions of a merge request
#[gitlab_tool(
    name = "get_mr_discussions",
    description = "List discussion threads of a merge request",
    category = "merge_requests",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetMrDiscussions {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for GetMrDiscussions {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let project = ctx.project()?;
        let discussions: Vec<Discussion> =
            collect_records(project.paginate(&mr_path(self.mr_iid, "/discussions"))).await?;
        ToolOutput::json(&discussions)
    }
}

/// Start a discussion thread
#[gitlab_tool(
    name = "add_mr_discussion",
    description = "Start a discussion thread on a merge request, optionally on a diff position",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct AddMrDiscussion {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
    /// Discussion body (Markdown)
    pub body: String,
    /// Diff position (base_sha, start_sha, head_sha, position_type, new_path, new_line, ...)
    #[serde(default)]
    pub position: Option<Map<String, Value>>,
}

#[async_trait]
impl ToolExecutor for AddMrDiscussion {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let mut body = json!({ "body": self.body });
        if let Some(position) = &self.position {
            body["position"] = Value::Object(position.clone());
        }

        let raw = ctx
            .project()?
            .post(&mr_path(self.mr_iid, "/discussions"), Some(&body))
            .await?;
        let mut discussion: Discussion = record(raw)?;
        discussion.individual_note = false;
        ToolOutput::json(&discussion)
    }
}

/// Comment on a merge request
#[gitlab_tool(
    name = "add_merge_request_comment",
    description = "Add a top-level comment to a merge request",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct AddMergeRequestComment {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
    /// Comment body (Markdown)
    pub body: String,
}

#[async_trait]
impl ToolExecutor for AddMergeRequestComment {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let body = json!({ "body": self.body });
        let raw = ctx
            .project()?
            .post(&mr_path(self.mr_iid, "/notes"), Some(&body))
            .await?;
        let note: Note = record(raw)?;
        ToolOutput::json(&note)
    }
}

// ============================================================================
// create / approve / merge
// ============================================================================

/// Create a merge request
#[gitlab_tool(
    name = "create_merge_request",
    description = "Create a new merge request",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct CreateMergeRequest {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Source branch
    pub source_branch: String,
    /// Target branch
    pub target_branch: String,
    /// Title
    pub title: String,
    /// Description (Markdown)
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait]
impl ToolExecutor for CreateMergeRequest {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let mut body = json!({
            "source_branch": self.source_branch,
            "target_branch": self.target_branch,
            "title": self.title,
        });
        if let Some(description) = non_empty(&self.description) {
            body["description"] = Value::String(description);
        }

        let raw = ctx.project()?.post("/merge_requests", Some(&body)).await?;
        let mr: MergeRequestDetails = record(raw)?;
        ToolOutput::json(&mr)
    }
}

/// Approve a merge request
#[gitlab_tool(
    name = "approve_merge_request",
    description = "Approve a merge request",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct ApproveMergeRequest {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for ApproveMergeRequest {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        ctx.project()?
            .post(&mr_path(self.mr_iid, "/approve"), None)
            .await?;
        ToolOutput::json(&ActionResult::new("approved", self.mr_iid))
    }
}

/// Revoke an approval
#[gitlab_tool(
    name = "unapprove_merge_request",
    description = "Remove the approval from a merge request",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct UnapproveMergeRequest {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
}

#[async_trait]
impl ToolExecutor for UnapproveMergeRequest {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        ctx.project()?
            .post(&mr_path(self.mr_iid, "/unapprove"), None)
            .await?;
        ToolOutput::json(&ActionResult::new("unapproved", self.mr_iid))
    }
}

/// Merge a merge request
#[gitlab_tool(
    name = "merge_merge_request",
    description = "Merge a merge request",
    category = "merge_requests",
    operation = "write",
    project_field = "project_id"
)]
pub struct MergeMergeRequest {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Merge request IID
    pub mr_iid: u64,
    /// Remove the source branch after merging
    #[serde(default)]
    pub should_remove_source_branch: bool,
}

#[async_trait]
impl ToolExecutor for MergeMergeRequest {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let body = self
            .should_remove_source_branch
            .then(|| json!({ "should_remove_source_branch": true }));

        ctx.project()?
            .put(&mr_path(self.mr_iid, "/merge"), body.as_ref())
            .await?;
        ToolOutput::json(&ActionResult::new("merged", self.mr_iid))
    }
}
