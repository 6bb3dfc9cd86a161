//! Tool execution framework
//!
//! Tools are plain argument structs implementing [`ToolExecutor`]. The
//! `#[gitlab_tool]` macro supplies [`ToolInfo`] and [`ProjectScoped`].

use crate::broker::{AccessBroker, AuthorizedProject};
use crate::error::{GitLabResult, ToolError, ToolResult};
// async_trait required for dyn-compatibility with the registry's type-erased handlers
use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Tool grouping, used for listing and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Projects,
    Repository,
    MergeRequests,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCategory::Projects => f.write_str("projects"),
            ToolCategory::Repository => f.write_str("repository"),
            ToolCategory::MergeRequests => f.write_str("merge_requests"),
        }
    }
}

/// Whether a tool mutates upstream state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Read,
    Write,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Read => f.write_str("read"),
            OperationType::Write => f.write_str("write"),
        }
    }
}

/// Static tool metadata
pub trait ToolInfo {
    fn name() -> &'static str;
    fn description() -> &'static str;
    fn category() -> ToolCategory;
    fn operation_type() -> OperationType;
}

/// Project a tool call targets, if any
///
/// A `Some` return makes the registry run the dual-authorization check
/// before the tool executes.
pub trait ProjectScoped {
    fn extract_project(&self) -> Option<String>;
}

/// Context available to a tool during execution
pub struct ToolContext {
    /// Broker bound to the calling user for this call
    pub broker: AccessBroker,
    /// Correlation id for log lines of this call
    pub request_id: String,
    project: Option<AuthorizedProject>,
}

impl ToolContext {
    pub fn new(broker: AccessBroker, request_id: impl Into<String>) -> Self {
        Self {
            broker,
            request_id: request_id.into(),
            project: None,
        }
    }

    /// Attach the project authorized for this call
    pub fn with_project(mut self, project: AuthorizedProject) -> Self {
        self.project = Some(project);
        self
    }

    /// The authorized project, for project-scoped tools
    pub fn project(&self) -> ToolResult<&AuthorizedProject> {
        self.project
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionFailed("no authorized project in context".into()))
    }
}

/// Tool implementation
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput>;
}

/// Content returned by a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text { text: String },
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Serialize a record (or list of records) as pretty JSON text
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ToolResult<Self> {
        Ok(Self::text(serde_json::to_string_pretty(value)?))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    /// Concatenated text of all blocks
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Deserialize a raw upstream value into an output record
pub fn record<T: DeserializeOwned>(value: Value) -> ToolResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ToolError::ExecutionFailed(format!("Unexpected GitLab response: {}", e)))
}

/// Drain a paginated listing into output records
pub async fn collect_records<T: DeserializeOwned>(
    stream: BoxStream<'_, GitLabResult<Value>>,
) -> ToolResult<Vec<T>> {
    let values: Vec<Value> = stream.try_collect().await?;
    values.into_iter().map(record).collect()
}
