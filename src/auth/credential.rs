//! Upstream credentials
//!
//! A resource client is bound to exactly one of these. The service
//! credential is configured once at startup; the delegated credential is the
//! caller's own bearer token and lives for a single tool call.

use crate::error::AuthError;
use crate::util::SecretString;

/// Which identity a credential represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Long-lived service account token
    Service,
    /// End user's OAuth access token
    Delegated,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::Service => f.write_str("service"),
            CredentialKind::Delegated => f.write_str("user"),
        }
    }
}

/// Credential used to authenticate against the GitLab API
#[derive(Debug, Clone)]
pub enum Credential {
    /// Service account token, sent as `PRIVATE-TOKEN`
    Service(SecretString),
    /// Caller's OAuth token, sent as `Authorization: Bearer`
    Delegated(SecretString),
}

impl Credential {
    /// Service credential from the configured token
    pub fn service(token: SecretString) -> Result<Self, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(Credential::Service(token))
    }

    /// Delegated credential from a verified caller token
    pub fn delegated(token: SecretString) -> Result<Self, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(Credential::Delegated(token))
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Service(_) => CredentialKind::Service,
            Credential::Delegated(_) => CredentialKind::Delegated,
        }
    }

    /// Header carrying this credential
    pub fn header(&self) -> AuthHeader<'_> {
        match self {
            Credential::Service(token) => AuthHeader::PrivateToken(token.expose_secret()),
            Credential::Delegated(token) => AuthHeader::Bearer(token.expose_secret()),
        }
    }
}

/// Authentication header to use with requests
#[derive(Debug, Clone, Copy)]
pub enum AuthHeader<'a> {
    /// Bearer token (used with OAuth2)
    Bearer(&'a str),
    /// Private token (used with service account tokens)
    PrivateToken(&'a str),
}

impl AuthHeader<'_> {
    /// Get the header name for this auth type
    pub fn header_name(&self) -> &'static str {
        match self {
            AuthHeader::Bearer(_) => "Authorization",
            AuthHeader::PrivateToken(_) => "PRIVATE-TOKEN",
        }
    }

    /// Get the header value for this auth type
    pub fn header_value(&self) -> String {
        match self {
            AuthHeader::Bearer(token) => format!("Bearer {}", token),
            AuthHeader::PrivateToken(token) => token.to_string(),
        }
    }
}
