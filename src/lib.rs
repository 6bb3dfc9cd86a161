//! tanuki-gate
//!
//! A Model Context Protocol server for GitLab that authorizes every
//! project-scoped operation twice.
//!
//! ## Dual Authorization Model
//!
//! ```text
//! caller token ──verify──▶ principal ──▶ broker
//!                                          │
//!                 service account ◀── 1. resolve project
//!                 calling user    ◀── 2. resolve project
//!                 service account ◀── 3. perform operation
//! ```
//!
//! - A project the service account cannot see is reported as not found,
//!   and the user is never asked about it.
//! - A project the user cannot see is denied even when the service
//!   account could act on it.
//! - All GitLab work after both checks runs as the service account.
//!
//! ## Example Configuration
//!
//! ```toml
//! [gitlab]
//! url = "https://gitlab.example.com"
//!
//! [secrets]
//! path = "/run/secrets/gitlab.json"
//!
//! [oauth]
//! base_url = "https://mcp.example.com:443"
//! redirect_path = "callback"
//! ```

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod server;
pub mod tools;
pub mod transport;
pub mod util;

// Re-export main types
pub use broker::{AccessBroker, AuthorizedProject, BrokerProvider};
pub use config::{AppConfig, load_config, load_secrets};
pub use server::GitLabMcpHandler;
