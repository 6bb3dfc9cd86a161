//! Authentication module
//!
//! Inbound: bearer verification and the OAuth proxy front.
//! Outbound: the two credentials the broker authenticates to GitLab with.

pub mod credential;
pub mod middleware;
pub mod oauth;
pub mod verifier;

pub use credential::{AuthHeader, Credential, CredentialKind};
pub use middleware::{AuthState, require_principal};
pub use oauth::{OAuthProxy, OAuthProxyConfig};
pub use verifier::{IntrospectionVerifier, Principal, TokenVerifier};

use rmcp::RoleServer;
use rmcp::service::RequestContext;

/// Principal injected by [`require_principal`] for the current MCP request
pub fn principal_from_context(context: &RequestContext<RoleServer>) -> Option<Principal> {
    context
        .extensions
        .get::<axum::http::request::Parts>()
        .and_then(|parts| parts.extensions.get::<Principal>())
        .cloned()
}
