//! Project tools
//!
//! Listing runs as the service account only: the result is the set of
//! projects the automation is enabled for.

use crate::error::ToolResult;
use crate::gitlab::{Project, ProjectFilter};
use crate::tools::executor::{ToolContext, ToolExecutor, ToolOutput};
use crate::tools::{ToolRegistry, gitlab_tool};
use async_trait::async_trait;
use futures::TryStreamExt;

/// Register all project tools
pub fn register(registry: &mut ToolRegistry) {
    registry.register::<ListProjects>();
}

/// List projects
#[gitlab_tool(
    name = "list_projects",
    description = "List GitLab projects the automation account is enabled for",
    category = "projects",
    operation = "read"
)]
pub struct ListProjects {
    /// Search by project name
    #[serde(default)]
    pub search: Option<String>,
    /// Only projects owned by the automation account
    #[serde(default)]
    pub owned: Option<bool>,
    /// Only projects the automation account is a member of
    #[serde(default)]
    pub membership: Option<bool>,
}

#[async_trait]
impl ToolExecutor for ListProjects {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let filter = ProjectFilter {
            search: self.search.clone().filter(|s| !s.is_empty()),
            owned: self.owned,
            membership: self.membership,
        };

        let projects: Vec<Project> = ctx.broker.list_projects(&filter).try_collect().await?;
        ToolOutput::json(&projects)
    }
}
