//! Bearer authentication for the MCP endpoint
//!
//! Verifies the caller's token and injects the resulting [`Principal`] into
//! request extensions. rmcp carries the HTTP request parts through to the
//! handler, which reads the principal back out per tool call.

use super::verifier::{Principal, TokenVerifier};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state for [`require_principal`]
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    /// Advertised in `WWW-Authenticate` so clients can discover the OAuth front
    pub resource_metadata_url: String,
}

impl AuthState {
    pub fn new(verifier: Arc<dyn TokenVerifier>, resource_metadata_url: impl Into<String>) -> Self {
        Self {
            verifier,
            resource_metadata_url: resource_metadata_url.into(),
        }
    }
}

/// Reject requests without a verifiable bearer token
pub async fn require_principal(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // CORS preflight
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    let Some(token) = token else {
        debug!("Missing bearer token");
        return unauthorized(&state, "Missing bearer token");
    };

    let Some(principal) = state.verifier.verify(token).await else {
        warn!("Bearer token rejected");
        return unauthorized(&state, "Invalid or expired token");
    };

    debug!(client_id = %principal.client_id, "Request authenticated");
    request.extensions_mut().insert::<Principal>(principal);
    next.run(request).await
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

fn unauthorized(state: &AuthState, description: &str) -> Response {
    let challenge = format!(
        r#"Bearer error="invalid_token", resource_metadata="{}""#,
        state.resource_metadata_url
    );
    let mut response = (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({
            "error": "invalid_token",
            "error_description": description,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::Router;
    use axum::routing::post;
    use tower::ServiceExt;

    struct StaticVerifier;

    #[async_trait]
    impl TokenVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Option<Principal> {
            (token == "good").then(|| Principal {
                token: token.into(),
                client_id: "client".into(),
                scopes: Default::default(),
            })
        }
    }

    async fn echo_client(request: Request<Body>) -> String {
        request
            .extensions()
            .get::<Principal>()
            .map(|p| p.client_id.clone())
            .unwrap_or_default()
    }

    fn app() -> Router {
        let state = AuthState::new(
            Arc::new(StaticVerifier),
            "https://mcp.example.com/.well-known/oauth-protected-resource",
        );
        Router::new()
            .route("/mcp", post(echo_client))
            .layer(axum::middleware::from_fn_with_state(state, require_principal))
    }

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/mcp");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[tokio::test]
    async fn test_missing_token_challenges() {
        let response = app().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("resource_metadata=\"https://mcp.example.com/"));
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let response = app().oneshot(request(Some("Bearer bad"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_injects_principal() {
        let response = app().oneshot(request(Some("Bearer good"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"client");
    }
}
