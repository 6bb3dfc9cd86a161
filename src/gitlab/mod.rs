//! GitLab API module
//!
//! Provides a typed client for the GitLab REST API and the
//! [`ResourceClient`] seam the broker is written against.

pub mod client;
pub mod resource;
pub mod types;

pub use client::{GitLabClient, build_http_client};
pub use resource::ResourceClient;
pub use types::*;
