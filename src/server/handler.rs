//! MCP server handler
//!
//! Implements the MCP protocol handler for GitLab tools. Every tool call
//! runs under the principal the auth middleware attached to its HTTP request.

use crate::auth::{Principal, principal_from_context};
use crate::broker::BrokerProvider;
use crate::config::AppConfig;
use crate::error::ToolError;
use crate::error::mcp_mapper::{authentication_required, error_to_json, map_tool_error};
use crate::tools::{ContentBlock, OperationType, ToolContext, ToolOutput, ToolRegistry};
use crate::util::request_id;
use rmcp::ErrorData as McpError;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeResult,
    ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, Tool,
    ToolsCapability,
};
use rmcp::service::{RequestContext, RoleServer};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// GitLab MCP server handler
#[derive(Clone)]
pub struct GitLabMcpHandler {
    /// Server name for MCP
    name: String,
    /// Server version
    version: String,
    /// Tool registry
    registry: Arc<ToolRegistry>,
    /// Per-call broker factory
    brokers: Arc<BrokerProvider>,
}

impl GitLabMcpHandler {
    /// Create a handler over shared resources
    ///
    /// One handler is cloned per MCP session; the registry and the service
    /// client behind `brokers` are shared by all of them.
    pub fn new(config: &AppConfig, registry: Arc<ToolRegistry>, brokers: Arc<BrokerProvider>) -> Self {
        info!(tools = registry.len(), "Initialized GitLab MCP handler");

        Self {
            name: config.server.name.clone(),
            version: config.server.version.clone(),
            registry,
            brokers,
        }
    }

    /// Convert internal tool output to MCP result
    fn to_mcp_result(output: ToolOutput) -> CallToolResult {
        let content = output
            .content
            .into_iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Content::text(text),
            })
            .collect();

        CallToolResult {
            content,
            is_error: Some(output.is_error),
            meta: None,
            structured_content: None,
        }
    }

    /// Tool failure as a result the model can read
    fn error_result(error: &ToolError) -> CallToolResult {
        CallToolResult {
            content: vec![Content::text(format!("Error: {}", error))],
            is_error: Some(true),
            meta: None,
            structured_content: Some(error_to_json(error)),
        }
    }

    /// Convert registry tools to MCP tool definitions
    pub fn get_mcp_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .registry
            .tools()
            .map(|tool| {
                // Convert schemars schema to MCP format (JsonObject = Map<String, Value>)
                let schema_value = serde_json::to_value(&tool.input_schema)
                    .unwrap_or_else(|_| serde_json::json!({}));

                let mut input_schema: Map<String, Value> = Map::new();
                input_schema.insert("type".to_string(), Value::String("object".to_string()));

                if let Some(props) = schema_value.get("properties") {
                    input_schema.insert("properties".to_string(), props.clone());
                }
                if let Some(required) = schema_value.get("required") {
                    input_schema.insert("required".to_string(), required.clone());
                }
                if let Some(defs) = schema_value.get("$defs") {
                    input_schema.insert("$defs".to_string(), defs.clone());
                }

                let description = match tool.operation {
                    OperationType::Read => tool.description.to_string(),
                    OperationType::Write => format!("{} (modifies GitLab)", tool.description),
                };

                Tool {
                    name: Cow::Owned(tool.name.to_string()),
                    description: Some(Cow::Owned(description)),
                    input_schema: Arc::new(input_schema),
                    annotations: None,
                    icons: None,
                    meta: None,
                    output_schema: None,
                    title: None,
                }
            })
            .collect();

        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool call on behalf of a verified principal
    ///
    /// Unknown tools are protocol errors; every other failure, including
    /// authorization denials, comes back as an error result.
    #[instrument(skip(self, principal, arguments), fields(client_id = %principal.client_id))]
    pub async fn call_tool_as(
        &self,
        principal: &Principal,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        if self.registry.get(name).is_none() {
            return Err(map_tool_error(&ToolError::NotFound(name.to_string())));
        }

        let broker = match self.brokers.broker_for(principal) {
            Ok(broker) => broker,
            Err(e) => {
                warn!(error = %e, "Could not build broker for caller");
                return Ok(Self::error_result(&ToolError::Broker(e)));
            }
        };

        let ctx = ToolContext::new(broker, request_id());

        // Get arguments or empty object - convert Map to Value
        let args = arguments
            .map(Value::Object)
            .unwrap_or_else(|| serde_json::json!({}));

        match self.registry.execute(name, ctx, args).await {
            Ok(output) => Ok(Self::to_mcp_result(output)),
            Err(e) => {
                error!(error = %e, "Tool execution failed");
                Ok(Self::error_result(&e))
            }
        }
    }

    /// Execute a tool call for whoever the transport authenticated, if anyone
    pub async fn call_tool_for(
        &self,
        principal: Option<&Principal>,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let Some(principal) = principal else {
            warn!("Tool call without authenticated principal");
            return Err(authentication_required());
        };
        self.call_tool_as(principal, name, arguments).await
    }
}

impl ServerHandler for GitLabMcpHandler {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                icons: None,
                title: None,
                website_url: None,
            },
            instructions: Some(
                "GitLab MCP Server - project operations require that both you and the \
                 automation account have access to the project"
                    .to_string(),
            ),
        }
    }

    #[instrument(skip(self, _context))]
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        debug!("Listing tools");
        async move {
            Ok(ListToolsResult {
                tools: self.get_mcp_tools(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    #[instrument(skip(self, context), fields(tool = %request.name))]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let principal = principal_from_context(&context);
        async move {
            self.call_tool_for(principal.as_ref(), &request.name, request.arguments)
                .await
        }
    }
}
