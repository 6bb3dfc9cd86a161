//! Transport module
//!
//! The server is reachable over streamable HTTP only: every request must
//! carry the caller's own bearer token.

pub mod http;

pub use http::{bind_addr, build_router, run_http};
