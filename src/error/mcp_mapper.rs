//! MCP error code mapping.
//!
//! Maps application errors to MCP protocol errors with appropriate JSON-RPC error codes.
//!
//! # Strategy
//! - Protocol-level errors (tool not found, missing principal) → `Err(McpError)`
//! - Tool execution errors → `Ok(CallToolResult { is_error: true })`, with the
//!   mapped error attached as structured content
//!
//! The `error_type` field is stable so that callers can tell a missing project
//! from a denied one from an invalid credential.

use rmcp::ErrorData as McpError;
use rmcp::model::ErrorCode;
use serde_json::{Value, json};
use std::borrow::Cow;

use super::{BrokerError, GitLabError, ToolError};

/// Maps a `ToolError` to an MCP protocol error.
pub fn map_tool_error(error: &ToolError) -> McpError {
    match error {
        ToolError::NotFound(name) => McpError {
            code: ErrorCode::METHOD_NOT_FOUND,
            message: Cow::Owned(format!("Tool '{}' not found", name)),
            data: Some(json!({
                "tool": name,
                "error_type": "ToolNotFound"
            })),
        },

        ToolError::InvalidArguments(msg) => McpError {
            code: ErrorCode::INVALID_PARAMS,
            message: Cow::Owned(msg.clone()),
            data: Some(json!({
                "error_type": "InvalidArguments"
            })),
        },

        ToolError::MissingArgument(arg) => McpError {
            code: ErrorCode::INVALID_PARAMS,
            message: Cow::Owned(format!("Missing required argument: {}", arg)),
            data: Some(json!({
                "argument": arg,
                "error_type": "MissingArgument"
            })),
        },

        ToolError::Serialization(e) => McpError {
            code: ErrorCode::INVALID_PARAMS,
            message: Cow::Owned(format!("Invalid argument format: {}", e)),
            data: Some(json!({
                "error_type": "SerializationError"
            })),
        },

        ToolError::ExecutionFailed(msg) => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(msg.clone()),
            data: Some(json!({
                "error_type": "ExecutionFailed"
            })),
        },

        ToolError::GitLab(gitlab_err) => map_gitlab_error(gitlab_err),

        ToolError::Broker(broker_err) => map_broker_error(broker_err),
    }
}

/// Maps a `BrokerError` to an MCP protocol error.
///
/// Denials carry the project and the error kind only.
pub fn map_broker_error(error: &BrokerError) -> McpError {
    match error {
        BrokerError::InvalidCredential => McpError {
            code: ErrorCode::INVALID_REQUEST,
            message: Cow::Owned(error.to_string()),
            data: Some(json!({
                "error_type": error.kind(),
                "hint": "Sign in again to obtain a fresh access token"
            })),
        },

        BrokerError::ResourceNotFound { project } => McpError {
            code: ErrorCode::RESOURCE_NOT_FOUND,
            message: Cow::Owned(error.to_string()),
            data: Some(json!({
                "error_type": error.kind(),
                "project": project
            })),
        },

        BrokerError::ServiceAccessDenied { project } | BrokerError::UserAccessDenied { project } => {
            McpError {
                code: ErrorCode::INVALID_REQUEST,
                message: Cow::Owned(error.to_string()),
                data: Some(json!({
                    "error_type": error.kind(),
                    "project": project
                })),
            }
        }

        BrokerError::Upstream(inner) => {
            let mut mapped = map_gitlab_error(inner);
            mapped.data = Some(json!({
                "error_type": error.kind(),
                "status": inner.status()
            }));
            mapped
        }
    }
}

/// Maps a `GitLabError` to an MCP protocol error.
pub fn map_gitlab_error(error: &GitLabError) -> McpError {
    match error {
        GitLabError::Unauthorized => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Borrowed("GitLab authentication failed"),
            data: Some(json!({
                "error_type": "Unauthorized"
            })),
        },

        GitLabError::Forbidden { action } => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!(
                "Forbidden: insufficient permissions for {}",
                action
            )),
            data: Some(json!({
                "error_type": "Forbidden",
                "action": action
            })),
        },

        GitLabError::NotFound { resource } => McpError {
            code: ErrorCode::RESOURCE_NOT_FOUND,
            message: Cow::Owned(format!("Resource not found: {}", resource)),
            data: Some(json!({
                "error_type": "NotFound",
                "resource": resource
            })),
        },

        GitLabError::RateLimited { retry_after } => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!("Rate limited, retry after {} seconds", retry_after)),
            data: Some(json!({
                "error_type": "RateLimited",
                "retry_after": retry_after
            })),
        },

        GitLabError::Timeout { timeout_secs } => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!("Request timeout after {} seconds", timeout_secs)),
            data: Some(json!({
                "error_type": "Timeout",
                "timeout_secs": timeout_secs
            })),
        },

        GitLabError::Api { status, message } => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!("GitLab API error (HTTP {}): {}", status, message)),
            data: Some(json!({
                "error_type": "ApiError",
                "status": status
            })),
        },

        GitLabError::Request(e) => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!("HTTP request failed: {}", e)),
            data: Some(json!({
                "error_type": "RequestError"
            })),
        },

        GitLabError::InvalidResponse(msg) => McpError {
            code: ErrorCode::INTERNAL_ERROR,
            message: Cow::Owned(format!("Invalid response from GitLab: {}", msg)),
            data: Some(json!({
                "error_type": "InvalidResponse"
            })),
        },
    }
}

/// Creates an MCP error for a call that arrived without a verified principal.
pub fn authentication_required() -> McpError {
    McpError {
        code: ErrorCode::INVALID_REQUEST,
        message: Cow::Borrowed("Authentication required"),
        data: Some(json!({
            "error_type": "InvalidCredential"
        })),
    }
}

/// Creates an MCP error for an internal server error.
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::Owned(message.into()),
        data: Some(json!({
            "error_type": "InternalError"
        })),
    }
}

/// Converts error data to a JSON value for inclusion in error responses.
pub fn error_to_json(error: &ToolError) -> Value {
    let mcp_error = map_tool_error(error);
    json!({
        "code": mcp_error.code.0,
        "message": mcp_error.message,
        "data": mcp_error.data
    })
}
