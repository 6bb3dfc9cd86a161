//! MCP server
//!
//! Protocol handler wiring tool calls to the registry and broker.

pub mod handler;

pub use handler::GitLabMcpHandler;
