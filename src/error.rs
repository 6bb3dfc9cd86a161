//! Error types for tanuki-gate
//!
//! This module defines the error hierarchy used throughout the application.
//! We use `thiserror` for library-style errors that are part of the API,
//! and convert to appropriate MCP error responses at the boundary.

pub mod mcp_mapper;

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid secrets file '{path}': {reason}")]
    Secrets { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// GitLab API specific errors
///
/// These are never translated by the resource client itself; the broker
/// decides what a given upstream failure means for authorization.
#[derive(Error, Debug)]
pub enum GitLabError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitLab API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: invalid or expired token")]
    Unauthorized,

    #[error("Forbidden: insufficient permissions for {action}")]
    Forbidden { action: String },

    #[error("Invalid response from GitLab: {0}")]
    InvalidResponse(String),

    #[error("Request timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl GitLabError {
    /// Create an appropriate error from an HTTP status code and response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match status {
            401 => GitLabError::Unauthorized,
            403 => GitLabError::Forbidden {
                action: "this operation".into(),
            },
            404 => GitLabError::NotFound {
                resource: "requested resource".into(),
            },
            429 => GitLabError::RateLimited { retry_after: 60 },
            _ => GitLabError::Api {
                status,
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
            },
        }
    }

    /// Numeric HTTP status carried by this error, when the upstream answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            GitLabError::Api { status, .. } => Some(*status),
            GitLabError::RateLimited { .. } => Some(429),
            GitLabError::NotFound { .. } => Some(404),
            GitLabError::Unauthorized => Some(401),
            GitLabError::Forbidden { .. } => Some(403),
            GitLabError::Request(e) => e.status().map(|s| s.as_u16()),
            GitLabError::InvalidResponse(_) | GitLabError::Timeout { .. } => None,
        }
    }

    /// Whether the upstream reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitLabError::NotFound { .. })
    }
}

/// Dual-authorization outcomes
///
/// Service and user denials are distinct kinds: the remediation differs
/// (enable the automation account vs. request access for the user).
/// None of these messages carry upstream bodies or credential detail.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid or expired credential")]
    InvalidCredential,

    #[error("Project '{project}' does not exist")]
    ResourceNotFound { project: String },

    #[error("The automation account is not enabled for project '{project}'")]
    ServiceAccessDenied { project: String },

    #[error("You do not have access to project '{project}'")]
    UserAccessDenied { project: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] GitLabError),
}

impl BrokerError {
    /// Stable tag for this error kind, carried through MCP error data
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::InvalidCredential => "InvalidCredential",
            BrokerError::ResourceNotFound { .. } => "ResourceNotFound",
            BrokerError::ServiceAccessDenied { .. } => "ServiceAccessDenied",
            BrokerError::UserAccessDenied { .. } => "UserAccessDenied",
            BrokerError::Upstream(_) => "UpstreamError",
        }
    }

    /// Project named by this error, if any
    pub fn project(&self) -> Option<&str> {
        match self {
            BrokerError::ResourceNotFound { project }
            | BrokerError::ServiceAccessDenied { project }
            | BrokerError::UserAccessDenied { project } => Some(project),
            BrokerError::InvalidCredential | BrokerError::Upstream(_) => None,
        }
    }
}

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("GitLab API error: {0}")]
    GitLab(#[from] GitLabError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Broker(#[from] BrokerError),
}

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token format")]
    InvalidToken,

    #[error("Unknown OAuth client: {0}")]
    UnknownClient(String),

    #[error("Invalid OAuth request: {0}")]
    InvalidRequest(String),

    #[error("Authorization grant is invalid or expired")]
    InvalidGrant,

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Upstream authorization server error: {0}")]
    Upstream(String),

    #[error("Upstream authorization server rejected the request (HTTP {status})")]
    UpstreamRejected {
        status: u16,
        body: serde_json::Value,
    },
}

impl AuthError {
    /// RFC 6749 error code for this failure
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            AuthError::UnknownClient(_) => "invalid_client",
            AuthError::InvalidRequest(_) | AuthError::InvalidToken => "invalid_request",
            AuthError::InvalidGrant => "invalid_grant",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::Upstream(_) | AuthError::UpstreamRejected { .. } => "server_error",
        }
    }
}

/// Result type alias for tool operations
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Result type alias for GitLab API operations
pub type GitLabResult<T> = std::result::Result<T, GitLabError>;

/// Result type alias for authorization decisions
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
