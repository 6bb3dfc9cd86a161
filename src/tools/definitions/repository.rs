//! Repository tools
//!
//! Tools for browsing repository files, trees, branches and commits.

use crate::error::{ToolError, ToolResult};
use crate::gitlab::{
    BlameEntry, Branch, CodeSearchResult, CommitDetails, CommitListItem, FileContent, TreeItem,
};
use crate::tools::executor::{
    ToolContext, ToolExecutor, ToolOutput, collect_records, record,
};
use crate::tools::{ToolRegistry, gitlab_tool};
use crate::util::QueryBuilder;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Register all repository tools
pub fn register(registry: &mut ToolRegistry) {
    registry.register::<GetRepositoryTree>();
    registry.register::<GetFileContent>();
    registry.register::<GetFileBlame>();
    registry.register::<SearchCode>();
    registry.register::<ListBranches>();
    registry.register::<ListCommits>();
    registry.register::<GetCommit>();
}

/// Get repository tree (file listing)
#[gitlab_tool(
    name = "get_repository_tree",
    description = "List files and directories of a repository path",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetRepositoryTree {
    /// Project ID or path (e.g., "group/project" or "123")
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Path inside the repository (default: root)
    #[serde(default)]
    pub path: Option<String>,
    /// Branch, tag, or commit SHA (default: default branch)
    #[serde(default, rename = "ref")]
    pub ref_name: Option<String>,
    /// Include subdirectories recursively
    #[serde(default)]
    pub recursive: bool,
}

#[async_trait]
impl ToolExecutor for GetRepositoryTree {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let query = QueryBuilder::new()
            .optional("path", self.path.as_ref())
            .optional("ref", self.ref_name.as_ref())
            .flag("recursive", self.recursive)
            .build();

        let project = ctx.project()?;
        let items: Vec<TreeItem> =
            collect_records(project.paginate(&format!("/repository/tree{}", query))).await?;
        ToolOutput::json(&items)
    }
}

/// Get file contents
#[gitlab_tool(
    name = "get_file_content",
    description = "Get the decoded contents of a file at a specific ref",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetFileContent {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Path to the file in the repository
    pub file_path: String,
    /// Branch, tag, or commit SHA (default: HEAD)
    #[serde(default, rename = "ref")]
    pub ref_name: Option<String>,
}

/// Decode a base64 file payload as UTF-8
fn decode_content(raw: &Value) -> ToolResult<String> {
    let content = raw.get("content").and_then(Value::as_str).unwrap_or_default();
    match raw.get("encoding").and_then(Value::as_str) {
        Some("base64") => {
            // GitLab may wrap long base64 payloads
            let compact: String = content.split_whitespace().collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| ToolError::ExecutionFailed(format!("Invalid base64 content: {}", e)))?;
            String::from_utf8(bytes)
                .map_err(|_| ToolError::ExecutionFailed("File is not valid UTF-8".into()))
        }
        _ => Ok(content.to_string()),
    }
}

#[async_trait]
impl ToolExecutor for GetFileContent {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let endpoint = format!(
            "/repository/files/{}?ref={}",
            urlencoding::encode(&self.file_path),
            urlencoding::encode(self.ref_name.as_deref().unwrap_or("HEAD"))
        );

        let mut raw = ctx.project()?.get(&endpoint).await?;
        let content = decode_content(&raw)?;
        if let Some(fields) = raw.as_object_mut() {
            fields.insert("content".into(), Value::String(content));
        }

        let file: FileContent = record(raw)?;
        ToolOutput::json(&file)
    }
}

/// Get file blame
#[gitlab_tool(
    name = "get_file_blame",
    description = "Get blame information (commit per line range) for a file",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetFileBlame {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Path to the file in the repository
    pub file_path: String,
    /// Branch, tag, or commit SHA (default: HEAD)
    #[serde(default, rename = "ref")]
    pub ref_name: Option<String>,
}

#[async_trait]
impl ToolExecutor for GetFileBlame {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let endpoint = format!(
            "/repository/files/{}/blame?ref={}",
            urlencoding::encode(&self.file_path),
            urlencoding::encode(self.ref_name.as_deref().unwrap_or("HEAD"))
        );

        let raw = ctx.project()?.get(&endpoint).await?;
        let blame: Vec<BlameEntry> = record(raw)?;
        ToolOutput::json(&blame)
    }
}

/// Search code in a project
#[gitlab_tool(
    name = "search_code",
    description = "Search file contents (blobs) in a project",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct SearchCode {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Search query
    pub query: String,
    /// Branch or tag to search (default: default branch)
    #[serde(default, rename = "ref")]
    pub ref_name: Option<String>,
}

#[async_trait]
impl ToolExecutor for SearchCode {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        if self.query.trim().is_empty() {
            return Err(ToolError::MissingArgument("query".into()));
        }

        let query = QueryBuilder::new()
            .param("scope", "blobs")
            .param("search", &self.query)
            .optional("ref", self.ref_name.as_ref())
            .build();

        let project = ctx.project()?;
        let results: Vec<CodeSearchResult> =
            collect_records(project.paginate(&format!("/search{}", query))).await?;
        ToolOutput::json(&results)
    }
}

/// List branches
#[gitlab_tool(
    name = "list_branches",
    description = "List repository branches",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct ListBranches {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Filter branches by name
    #[serde(default)]
    pub search: Option<String>,
}

#[async_trait]
impl ToolExecutor for ListBranches {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let query = QueryBuilder::new()
            .optional("search", self.search.as_ref())
            .build();

        let project = ctx.project()?;
        let branches: Vec<Branch> =
            collect_records(project.paginate(&format!("/repository/branches{}", query))).await?;
        ToolOutput::json(&branches)
    }
}

/// List commits
#[gitlab_tool(
    name = "list_commits",
    description = "List commits of a branch or ref, optionally within a date range",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct ListCommits {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Branch, tag, or commit SHA (default: default branch)
    #[serde(default)]
    pub ref_name: Option<String>,
    /// Only commits after this date (ISO 8601)
    #[serde(default)]
    pub since: Option<String>,
    /// Only commits before this date (ISO 8601)
    #[serde(default)]
    pub until: Option<String>,
}

#[async_trait]
impl ToolExecutor for ListCommits {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let query = QueryBuilder::new()
            .optional("ref_name", self.ref_name.as_ref())
            .optional("since", self.since.as_ref())
            .optional("until", self.until.as_ref())
            .build();

        let project = ctx.project()?;
        let commits: Vec<CommitListItem> =
            collect_records(project.paginate(&format!("/repository/commits{}", query))).await?;
        ToolOutput::json(&commits)
    }
}

/// Get a single commit
#[gitlab_tool(
    name = "get_commit",
    description = "Get a commit with its parents and diff stats",
    category = "repository",
    operation = "read",
    project_field = "project_id"
)]
pub struct GetCommit {
    /// Project ID or path
    #[serde(deserialize_with = "super::project_id")]
    pub project_id: String,
    /// Commit SHA, branch or tag
    pub sha: String,
}

#[async_trait]
impl ToolExecutor for GetCommit {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let endpoint = format!("/repository/commits/{}", urlencoding::encode(&self.sha));
        let commit: CommitDetails = record(ctx.project()?.get(&endpoint).await?)?;
        ToolOutput::json(&commit)
    }
}
