//! OAuth proxy front
//!
//! This service is the single confidential client registered on GitLab.
//! MCP clients register with us dynamically, run the authorization-code flow
//! through us, and end up holding a GitLab access token issued to our
//! application. That token is what they present on `/mcp`.
//!
//! ```text
//! client ──/authorize──▶ proxy ──302──▶ gitlab/oauth/authorize
//! gitlab ──/callback───▶ proxy ──302──▶ client redirect_uri (code, state)
//! client ──/token──────▶ proxy ──POST─▶ gitlab/oauth/token (client secret)
//! ```
//!
//! All pending state is in memory and short-lived.

use crate::config::{AppConfig, Secrets};
use crate::error::AuthError;
use crate::util::{SecretString, random_token};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Static settings of the proxy
#[derive(Debug, Clone)]
pub struct OAuthProxyConfig {
    pub upstream_authorization_endpoint: String,
    pub upstream_token_endpoint: String,
    pub upstream_client_id: String,
    pub upstream_client_secret: SecretString,
    /// Externally reachable base URL of this service
    pub base_url: String,
    /// Absolute callback URL registered upstream
    pub callback_url: String,
    /// Route path serving the callback
    pub callback_route: String,
    pub scopes: Vec<String>,
    pub pending_ttl: Duration,
    /// Idle time after which a registered client is dropped
    pub client_ttl: Duration,
    pub max_clients: usize,
}

impl OAuthProxyConfig {
    pub fn from_config(config: &AppConfig, secrets: &Secrets) -> Self {
        Self {
            upstream_authorization_endpoint: config.gitlab.authorize_url(),
            upstream_token_endpoint: config.gitlab.token_url(),
            upstream_client_id: secrets.oauth_client_id.clone(),
            upstream_client_secret: secrets.oauth_client_secret.clone(),
            base_url: config.oauth.public_url().to_string(),
            callback_url: config.oauth.callback_url(),
            callback_route: config.oauth.callback_route(),
            scopes: config.oauth.required_scopes.clone(),
            pending_ttl: Duration::from_secs(config.oauth.pending_ttl_secs),
            client_ttl: Duration::from_secs(config.oauth.client_ttl_secs),
            max_clients: config.oauth.max_clients,
        }
    }

    /// URL of the protected resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.base_url)
    }
}

/// Dynamically registered MCP client
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_id_issued_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

/// RFC 7591 registration request (the fields we honor)
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

/// OAuth authorization query params
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Query params GitLab sends to our callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// OAuth token request body
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Authorization waiting for the upstream callback
#[derive(Debug, Clone)]
struct PendingAuthorization {
    client_id: String,
    redirect_uri: String,
    state: Option<String>,
    expires_at: Instant,
}

/// Registered client with its last activity
#[derive(Debug, Clone)]
struct ClientEntry {
    client: RegisteredClient,
    last_used: Instant,
}

/// Upstream code handed to a client, awaiting exchange
#[derive(Debug, Clone)]
struct CodeBinding {
    client_id: String,
    redirect_uri: String,
    expires_at: Instant,
}

/// OAuth proxy state
pub struct OAuthProxy {
    config: OAuthProxyConfig,
    http: reqwest::Client,
    clients: RwLock<HashMap<String, ClientEntry>>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    codes: RwLock<HashMap<String, CodeBinding>>,
}

impl OAuthProxy {
    pub fn new(config: OAuthProxyConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            clients: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            codes: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OAuthProxyConfig {
        &self.config
    }

    /// RFC 8414 authorization server metadata
    pub fn metadata(&self) -> Value {
        let base = &self.config.base_url;
        json!({
            "issuer": base,
            "authorization_endpoint": format!("{}/authorize", base),
            "token_endpoint": format!("{}/token", base),
            "registration_endpoint": format!("{}/register", base),
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "code_challenge_methods_supported": ["S256"],
            "token_endpoint_auth_methods_supported": ["none"],
            "scopes_supported": self.config.scopes,
        })
    }

    /// RFC 9728 protected resource metadata
    pub fn resource_metadata(&self) -> Value {
        let base = &self.config.base_url;
        json!({
            "resource": format!("{}/mcp", base),
            "authorization_servers": [base],
            "scopes_supported": self.config.scopes,
            "bearer_methods_supported": ["header"],
        })
    }

    /// Register an MCP client
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegisteredClient, AuthError> {
        if request.redirect_uris.is_empty() {
            return Err(AuthError::InvalidRequest(
                "at least one redirect_uri is required".into(),
            ));
        }
        if let Some(bad) = request.redirect_uris.iter().find(|u| Url::parse(u).is_err()) {
            return Err(AuthError::InvalidRequest(format!(
                "invalid redirect_uri: {}",
                bad
            )));
        }

        let client = RegisteredClient {
            client_id: random_token(),
            client_id_issued_at: unix_now(),
            client_name: request.client_name,
            redirect_uris: request.redirect_uris,
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            token_endpoint_auth_method: "none".into(),
        };

        let now = Instant::now();
        let mut clients = self.clients.write().await;
        let ttl = self.config.client_ttl;
        clients.retain(|_, entry| now.duration_since(entry.last_used) < ttl);
        while clients.len() >= self.config.max_clients {
            let Some(oldest) = clients
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(client_id = %oldest, "Evicting least recently used OAuth client");
            clients.remove(&oldest);
        }

        info!(client_id = %client.client_id, name = ?client.client_name, "Registered OAuth client");
        clients.insert(
            client.client_id.clone(),
            ClientEntry {
                client: client.clone(),
                last_used: now,
            },
        );
        Ok(client)
    }

    /// Look up a live client and mark it as used
    async fn touch_client(&self, client_id: &str) -> Result<RegisteredClient, AuthError> {
        let now = Instant::now();
        let mut clients = self.clients.write().await;
        match clients.get_mut(client_id) {
            Some(entry) if now.duration_since(entry.last_used) < self.config.client_ttl => {
                entry.last_used = now;
                Ok(entry.client.clone())
            }
            Some(_) => {
                clients.remove(client_id);
                Err(AuthError::UnknownClient(client_id.to_string()))
            }
            None => Err(AuthError::UnknownClient(client_id.to_string())),
        }
    }

    /// Validate an authorization request and return the upstream URL to redirect to
    #[instrument(skip(self, params), fields(client_id = %params.client_id))]
    pub async fn begin_authorization(&self, params: AuthorizeParams) -> Result<Url, AuthError> {
        if params.response_type != "code" {
            return Err(AuthError::InvalidRequest(format!(
                "unsupported response_type: {}",
                params.response_type
            )));
        }

        let client = self.touch_client(&params.client_id).await?;
        if !client.redirect_uris.contains(&params.redirect_uri) {
            return Err(AuthError::InvalidRequest(
                "redirect_uri not registered for this client".into(),
            ));
        }

        let txn = random_token();
        let mut query = vec![
            ("client_id", self.config.upstream_client_id.clone()),
            ("redirect_uri", self.config.callback_url.clone()),
            ("response_type", "code".to_string()),
            ("state", txn.clone()),
            ("scope", self.config.scopes.join(" ")),
        ];
        if let Some(challenge) = &params.code_challenge {
            query.push(("code_challenge", challenge.clone()));
            query.push((
                "code_challenge_method",
                params
                    .code_challenge_method
                    .clone()
                    .unwrap_or_else(|| "S256".to_string()),
            ));
        }

        let upstream = Url::parse_with_params(&self.config.upstream_authorization_endpoint, &query)
            .map_err(|e| AuthError::Upstream(format!("invalid authorization endpoint: {}", e)))?;

        let now = Instant::now();
        let mut pending = self.pending.write().await;
        pending.retain(|_, p| p.expires_at > now);
        pending.insert(
            txn,
            PendingAuthorization {
                client_id: params.client_id,
                redirect_uri: params.redirect_uri,
                state: params.state,
                expires_at: now + self.config.pending_ttl,
            },
        );

        debug!("Redirecting to upstream authorization endpoint");
        Ok(upstream)
    }

    /// Handle the upstream callback and return the client redirect
    #[instrument(skip_all)]
    pub async fn complete_authorization(&self, params: CallbackParams) -> Result<Url, AuthError> {
        let txn = params
            .state
            .ok_or_else(|| AuthError::InvalidRequest("missing state".into()))?;

        let pending = self
            .pending
            .write()
            .await
            .remove(&txn)
            .filter(|p| p.expires_at > Instant::now())
            .ok_or(AuthError::InvalidGrant)?;

        let mut redirect = Url::parse(&pending.redirect_uri)
            .map_err(|e| AuthError::InvalidRequest(format!("invalid redirect_uri: {}", e)))?;

        let mut pairs: Vec<(&str, String)> = Vec::new();
        match (params.error, params.code) {
            (Some(error), _) => {
                warn!(client_id = %pending.client_id, error = %error, "Upstream authorization failed");
                pairs.push(("error", error));
                if let Some(description) = params.error_description {
                    pairs.push(("error_description", description));
                }
            }
            (None, Some(code)) => {
                let now = Instant::now();
                let mut codes = self.codes.write().await;
                codes.retain(|_, c| c.expires_at > now);
                codes.insert(
                    code.clone(),
                    CodeBinding {
                        client_id: pending.client_id.clone(),
                        redirect_uri: pending.redirect_uri.clone(),
                        expires_at: now + self.config.pending_ttl,
                    },
                );
                pairs.push(("code", code));
            }
            (None, None) => {
                return Err(AuthError::InvalidRequest("missing code".into()));
            }
        }
        if let Some(state) = &pending.state {
            pairs.push(("state", state.clone()));
        }
        redirect.query_pairs_mut().extend_pairs(&pairs);

        info!(client_id = %pending.client_id, "Authorization completed");
        Ok(redirect)
    }

    /// Exchange a grant at the upstream token endpoint
    #[instrument(skip_all, fields(grant_type = %request.grant_type))]
    pub async fn exchange(&self, request: TokenRequest) -> Result<Value, AuthError> {
        let mut params: HashMap<&str, String> = HashMap::new();
        params.insert("client_id", self.config.upstream_client_id.clone());
        params.insert(
            "client_secret",
            self.config.upstream_client_secret.expose_secret().to_string(),
        );

        match request.grant_type.as_str() {
            "authorization_code" => {
                let code = request
                    .code
                    .ok_or_else(|| AuthError::InvalidRequest("missing code".into()))?;
                let client_id = request
                    .client_id
                    .ok_or_else(|| AuthError::InvalidRequest("missing client_id".into()))?;

                let binding = self
                    .codes
                    .write()
                    .await
                    .remove(&code)
                    .filter(|b| b.expires_at > Instant::now())
                    .ok_or(AuthError::InvalidGrant)?;

                if client_id != binding.client_id {
                    warn!("client_id mismatch on code exchange");
                    return Err(AuthError::InvalidGrant);
                }
                self.touch_client(&client_id).await?;
                if request
                    .redirect_uri
                    .as_ref()
                    .is_some_and(|uri| uri != &binding.redirect_uri)
                {
                    warn!("redirect_uri mismatch on code exchange");
                    return Err(AuthError::InvalidGrant);
                }

                params.insert("grant_type", "authorization_code".into());
                params.insert("code", code);
                params.insert("redirect_uri", self.config.callback_url.clone());
                if let Some(verifier) = request.code_verifier {
                    params.insert("code_verifier", verifier);
                }
            }
            "refresh_token" => {
                let refresh = request
                    .refresh_token
                    .ok_or_else(|| AuthError::InvalidRequest("missing refresh_token".into()))?;
                params.insert("grant_type", "refresh_token".into());
                params.insert("refresh_token", refresh);
            }
            other => return Err(AuthError::UnsupportedGrantType(other.to_string())),
        }

        let response = self
            .http
            .post(&self.config.upstream_token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("invalid token response: {}", e)))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Upstream token endpoint rejected grant");
            return Err(AuthError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::UpstreamRejected { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                Json(body),
            )
                .into_response(),
            other => {
                let status = match other {
                    AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    AuthError::UnknownClient(_) => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::BAD_REQUEST,
                };
                (
                    status,
                    Json(json!({
                        "error": other.oauth_error_code(),
                        "error_description": other.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

async fn authorization_server_metadata(State(proxy): State<Arc<OAuthProxy>>) -> Json<Value> {
    Json(proxy.metadata())
}

async fn protected_resource_metadata(State(proxy): State<Arc<OAuthProxy>>) -> Json<Value> {
    Json(proxy.resource_metadata())
}

async fn register(
    State(proxy): State<Arc<OAuthProxy>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegisteredClient>), AuthError> {
    let client = proxy.register(request).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn authorize(
    State(proxy): State<Arc<OAuthProxy>>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, AuthError> {
    let upstream = proxy.begin_authorization(params).await?;
    Ok(Redirect::to(upstream.as_str()))
}

async fn callback(
    State(proxy): State<Arc<OAuthProxy>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AuthError> {
    let redirect = proxy.complete_authorization(params).await?;
    Ok(Redirect::to(redirect.as_str()))
}

async fn token(
    State(proxy): State<Arc<OAuthProxy>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<Value>, AuthError> {
    proxy.exchange(request).await.map(Json)
}

/// Public OAuth routes
pub fn router(proxy: Arc<OAuthProxy>) -> Router {
    let callback_route = proxy.config.callback_route.clone();
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(protected_resource_metadata),
        )
        .route("/register", post(register))
        .route("/authorize", get(authorize))
        .route(&callback_route, get(callback))
        .route("/token", post(token))
        .with_state(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn proxy_config(upstream: &str) -> OAuthProxyConfig {
        OAuthProxyConfig {
            upstream_authorization_endpoint: format!("{}/oauth/authorize", upstream),
            upstream_token_endpoint: format!("{}/oauth/token", upstream),
            upstream_client_id: "app-id".into(),
            upstream_client_secret: SecretString::new("app-secret"),
            base_url: "https://mcp.example.com:443".into(),
            callback_url: "https://mcp.example.com:443/callback".into(),
            callback_route: "/callback".into(),
            scopes: vec!["read_user".into(), "read_api".into(), "read_repository".into()],
            pending_ttl: Duration::from_secs(600),
            client_ttl: Duration::from_secs(3600),
            max_clients: 100,
        }
    }

    async fn registered(proxy: &OAuthProxy) -> RegisteredClient {
        proxy
            .register(RegistrationRequest {
                redirect_uris: vec!["http://127.0.0.1:5555/cb".into()],
                client_name: Some("test client".into()),
            })
            .await
            .unwrap()
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    fn authorize_params(client_id: &str) -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".into(),
            client_id: client_id.into(),
            redirect_uri: "http://127.0.0.1:5555/cb".into(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
        }
    }

    /// Run authorize and callback so `code` is bound to `client_id`
    async fn bind_code(proxy: &OAuthProxy, client_id: &str, code: &str) {
        let upstream = proxy
            .begin_authorization(authorize_params(client_id))
            .await
            .unwrap();
        proxy
            .complete_authorization(CallbackParams {
                code: Some(code.into()),
                state: Some(query(&upstream)["state"].clone()),
                error: None,
                error_description: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_requires_redirect_uri() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let err = proxy
            .register(RegistrationRequest {
                redirect_uris: vec![],
                client_name: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_authorize_redirects_upstream_with_our_client() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let client = registered(&proxy).await;

        let upstream = proxy
            .begin_authorization(AuthorizeParams {
                response_type: "code".into(),
                client_id: client.client_id.clone(),
                redirect_uri: "http://127.0.0.1:5555/cb".into(),
                state: Some("client-state".into()),
                code_challenge: Some("challenge".into()),
                code_challenge_method: Some("S256".into()),
            })
            .await
            .unwrap();

        assert!(upstream.as_str().starts_with("https://gitlab/oauth/authorize?"));
        let q = query(&upstream);
        assert_eq!(q["client_id"], "app-id");
        assert_eq!(q["redirect_uri"], "https://mcp.example.com:443/callback");
        assert_eq!(q["scope"], "read_user read_api read_repository");
        assert_eq!(q["code_challenge"], "challenge");
        assert_ne!(q["state"], "client-state");
    }

    #[tokio::test]
    async fn test_authorize_rejects_unregistered_redirect() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let client = registered(&proxy).await;

        let err = proxy
            .begin_authorization(AuthorizeParams {
                response_type: "code".into(),
                client_id: client.client_id,
                redirect_uri: "https://evil.example.com/cb".into(),
                state: None,
                code_challenge: None,
                code_challenge_method: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_authorize_rejects_unknown_client() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let err = proxy
            .begin_authorization(AuthorizeParams {
                response_type: "code".into(),
                client_id: "nobody".into(),
                redirect_uri: "http://127.0.0.1:5555/cb".into(),
                state: None,
                code_challenge: None,
                code_challenge_method: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn test_full_code_flow() {
        let gitlab = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("client_secret=app-secret"))
            .and(body_string_contains("code=upstream-code"))
            .and(body_string_contains("code_verifier=verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gitlab-access",
                "token_type": "Bearer",
                "refresh_token": "gitlab-refresh",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&gitlab)
            .await;

        let proxy = OAuthProxy::new(proxy_config(&gitlab.uri()), reqwest::Client::new());
        let client = registered(&proxy).await;

        let upstream = proxy
            .begin_authorization(AuthorizeParams {
                response_type: "code".into(),
                client_id: client.client_id.clone(),
                redirect_uri: "http://127.0.0.1:5555/cb".into(),
                state: Some("client-state".into()),
                code_challenge: Some("challenge".into()),
                code_challenge_method: None,
            })
            .await
            .unwrap();
        let txn = query(&upstream)["state"].clone();

        let redirect = proxy
            .complete_authorization(CallbackParams {
                code: Some("upstream-code".into()),
                state: Some(txn.clone()),
                error: None,
                error_description: None,
            })
            .await
            .unwrap();
        let q = query(&redirect);
        assert_eq!(redirect.host_str(), Some("127.0.0.1"));
        assert_eq!(q["code"], "upstream-code");
        assert_eq!(q["state"], "client-state");

        // Transaction is single use
        assert!(
            proxy
                .complete_authorization(CallbackParams {
                    code: Some("upstream-code".into()),
                    state: Some(txn),
                    error: None,
                    error_description: None,
                })
                .await
                .is_err()
        );

        let tokens = proxy
            .exchange(TokenRequest {
                grant_type: "authorization_code".into(),
                code: Some("upstream-code".into()),
                redirect_uri: Some("http://127.0.0.1:5555/cb".into()),
                client_id: Some(client.client_id),
                code_verifier: Some("verifier".into()),
                refresh_token: None,
            })
            .await
            .unwrap();
        assert_eq!(tokens["access_token"], "gitlab-access");
    }

    #[tokio::test]
    async fn test_exchange_rejects_unbound_code() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let err = proxy
            .exchange(TokenRequest {
                grant_type: "authorization_code".into(),
                code: Some("never-issued".into()),
                redirect_uri: None,
                client_id: Some("someone".into()),
                code_verifier: None,
                refresh_token: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant));
    }

    #[tokio::test]
    async fn test_exchange_requires_client_id() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let client = registered(&proxy).await;
        bind_code(&proxy, &client.client_id, "upstream-code").await;

        let err = proxy
            .exchange(TokenRequest {
                grant_type: "authorization_code".into(),
                code: Some("upstream-code".into()),
                redirect_uri: Some("http://127.0.0.1:5555/cb".into()),
                client_id: None,
                code_verifier: None,
                refresh_token: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_exchange_rejects_other_client() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let client = registered(&proxy).await;
        let other = registered(&proxy).await;
        bind_code(&proxy, &client.client_id, "upstream-code").await;

        let err = proxy
            .exchange(TokenRequest {
                grant_type: "authorization_code".into(),
                code: Some("upstream-code".into()),
                redirect_uri: None,
                client_id: Some(other.client_id),
                code_verifier: None,
                refresh_token: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant));
    }

    #[tokio::test]
    async fn test_register_evicts_least_recently_used() {
        let mut config = proxy_config("https://gitlab");
        config.max_clients = 2;
        let proxy = OAuthProxy::new(config, reqwest::Client::new());

        let first = registered(&proxy).await;
        let second = registered(&proxy).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Using `first` leaves `second` as the idlest entry
        proxy
            .begin_authorization(authorize_params(&first.client_id))
            .await
            .unwrap();
        let third = registered(&proxy).await;

        assert_eq!(proxy.clients.read().await.len(), 2);
        let err = proxy
            .begin_authorization(authorize_params(&second.client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
        assert!(proxy.begin_authorization(authorize_params(&first.client_id)).await.is_ok());
        assert!(proxy.begin_authorization(authorize_params(&third.client_id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_client_expires() {
        let mut config = proxy_config("https://gitlab");
        config.client_ttl = Duration::ZERO;
        let proxy = OAuthProxy::new(config, reqwest::Client::new());
        let client = registered(&proxy).await;

        let err = proxy
            .begin_authorization(authorize_params(&client.client_id))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");

        // Expired entries are pruned on the next registration
        registered(&proxy).await;
        let clients = proxy.clients.read().await;
        assert_eq!(clients.len(), 1);
        assert!(!clients.contains_key(&client.client_id));
    }

    #[tokio::test]
    async fn test_exchange_relays_upstream_rejection() {
        let gitlab = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "The provided authorization grant is invalid"
            })))
            .mount(&gitlab)
            .await;

        let proxy = OAuthProxy::new(proxy_config(&gitlab.uri()), reqwest::Client::new());
        let err = proxy
            .exchange(TokenRequest {
                grant_type: "refresh_token".into(),
                code: None,
                redirect_uri: None,
                client_id: None,
                code_verifier: None,
                refresh_token: Some("stale".into()),
            })
            .await
            .unwrap_err();
        match err {
            AuthError::UpstreamRejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body["error"], "invalid_grant");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_grant() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let err = proxy
            .exchange(TokenRequest {
                grant_type: "password".into(),
                code: None,
                redirect_uri: None,
                client_id: None,
                code_verifier: None,
                refresh_token: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unsupported_grant_type");
    }

    #[test]
    fn test_metadata_points_at_self() {
        let proxy = OAuthProxy::new(proxy_config("https://gitlab"), reqwest::Client::new());
        let meta = proxy.metadata();
        assert_eq!(meta["issuer"], "https://mcp.example.com:443");
        assert_eq!(meta["token_endpoint"], "https://mcp.example.com:443/token");

        let resource = proxy.resource_metadata();
        assert_eq!(resource["resource"], "https://mcp.example.com:443/mcp");
    }
}
