//! Tool registry
//!
//! Manages the collection of available tools and their metadata, and runs
//! the project authorization step in front of every project-scoped tool.

use crate::error::ToolError;
use crate::tools::executor::{
    OperationType, ProjectScoped, ToolCategory, ToolContext, ToolExecutor, ToolInfo, ToolOutput,
};
// async_trait required for dyn-compatibility with Box<dyn ToolHandler>
use async_trait::async_trait;
use schemars::Schema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// A registered tool with all its metadata
pub struct RegisteredTool {
    /// Tool name
    pub name: &'static str,
    /// Tool description
    pub description: &'static str,
    pub category: ToolCategory,
    pub operation: OperationType,
    /// JSON Schema for the tool's input
    pub input_schema: Schema,
    /// The tool handler
    handler: Box<dyn ToolHandler>,
}

/// Internal trait for type-erased tool handling
#[async_trait]
trait ToolHandler: Send + Sync {
    /// Execute the tool with raw JSON arguments
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutput, ToolError>;

    /// Extract the target project from arguments
    fn extract_project(&self, args: &Value) -> Result<Option<String>, ToolError>;
}

/// Generic tool handler implementation
struct TypedToolHandler<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> TypedToolHandler<T> {
    fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::InvalidArguments(format!("Failed to parse arguments: {}", e)))
}

#[async_trait]
impl<T> ToolHandler for TypedToolHandler<T>
where
    T: ToolExecutor + DeserializeOwned + ProjectScoped + Send + Sync + 'static,
{
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutput, ToolError> {
        let tool: T = parse_arguments(args)?;
        tool.execute(ctx).await
    }

    fn extract_project(&self, args: &Value) -> Result<Option<String>, ToolError> {
        let tool: T = parse_arguments(args.clone())?;
        Ok(tool.extract_project())
    }
}

/// Tool registry
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    by_category: HashMap<ToolCategory, Vec<String>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            by_category: HashMap::new(),
        }
    }

    /// Registry with every GitLab tool
    pub fn with_all_tools() -> Self {
        let mut registry = Self::new();
        crate::tools::definitions::register_all_tools(&mut registry);
        info!(tools = registry.len(), "Initialized tool registry");
        registry
    }

    /// Register a tool
    pub fn register<T>(&mut self)
    where
        T: ToolExecutor
            + DeserializeOwned
            + ProjectScoped
            + schemars::JsonSchema
            + ToolInfo
            + Send
            + Sync
            + 'static,
    {
        let name = <T as ToolInfo>::name();
        let category = <T as ToolInfo>::category();

        let tool = RegisteredTool {
            name,
            description: <T as ToolInfo>::description(),
            category,
            operation: <T as ToolInfo>::operation_type(),
            input_schema: schemars::schema_for!(T),
            handler: Box::new(TypedToolHandler::<T>::new()),
        };

        self.by_category
            .entry(category)
            .or_default()
            .push(name.to_string());
        self.tools.insert(name.to_string(), tool);

        debug!(name = name, category = %category, "Registered tool");
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Get all tools
    pub fn tools(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.values()
    }

    /// Get tools by category
    pub fn tools_in_category(&self, category: ToolCategory) -> Vec<&RegisteredTool> {
        self.by_category
            .get(&category)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.tools.get(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    ///
    /// Project-scoped tools only run after the broker authorized their
    /// project for both identities.
    #[instrument(skip(self, ctx, args), fields(tool = %name, request_id = %ctx.request_id))]
    pub async fn execute(
        &self,
        name: &str,
        ctx: ToolContext,
        args: Value,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let ctx = match tool.handler.extract_project(&args)? {
            Some(project) if project.trim().is_empty() => {
                return Err(ToolError::MissingArgument("project_id".into()));
            }
            Some(project) => match ctx.broker.authorize_project(&project).await {
                Ok(authorized) => ctx.with_project(authorized),
                Err(e) => {
                    // Audit log: access denied
                    warn!(
                        tool = %name,
                        project = %project,
                        request_id = %ctx.request_id,
                        reason = e.kind(),
                        "Access denied to tool"
                    );
                    return Err(e.into());
                }
            },
            None => ctx,
        };

        let result = tool.handler.call(&ctx, args).await;

        debug!(
            operation = %tool.operation,
            success = result.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool finished"
        );

        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
