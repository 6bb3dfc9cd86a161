//! GitLab API client
//!
//! Provides a typed HTTP client for the GitLab REST API bound to a single
//! [`Credential`]. Upstream failures are surfaced as-is; interpreting them
//! is the broker's job.

use crate::auth::{Credential, CredentialKind};
use crate::config::GitLabConfig;
use crate::error::{GitLabError, GitLabResult};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Certificate, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Page size used when walking paginated endpoints
pub const PER_PAGE: u32 = 100;

/// Build the HTTP pool shared by every client in the process
///
/// Delegated clients are created per tool call; they clone this pool rather
/// than opening their own connections.
pub fn build_http_client(config: &GitLabConfig) -> GitLabResult<Client> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("tanuki-gate/{}", env!("CARGO_PKG_VERSION")));

    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(user_agent);

    if let Some(path) = &config.ca_cert_path {
        let pem = std::fs::read(path).map_err(|e| {
            GitLabError::InvalidResponse(format!(
                "Failed to read CA certificate {}: {}",
                path.display(),
                e
            ))
        })?;
        let cert = Certificate::from_pem(&pem).map_err(GitLabError::Request)?;
        builder = builder.add_root_certificate(cert);
    }

    builder.build().map_err(GitLabError::Request)
}

/// GitLab API client
#[derive(Clone)]
pub struct GitLabClient {
    http: Client,
    base_url: String,
    credential: Credential,
    timeout_secs: u64,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.kind())
            .finish()
    }
}

impl GitLabClient {
    /// Create a client on an existing HTTP pool
    pub fn new(http: Client, config: &GitLabConfig, credential: Credential) -> Self {
        Self {
            http,
            base_url: config.api_url(),
            credential,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Create a client with its own HTTP pool
    pub fn from_config(config: &GitLabConfig, credential: Credential) -> GitLabResult<Self> {
        Ok(Self::new(build_http_client(config)?, config, credential))
    }

    pub fn credential_kind(&self) -> CredentialKind {
        self.credential.kind()
    }

    /// Build a URL for an API endpoint
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Add authentication to a request
    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        let header = self.credential.header();
        request.header(header.header_name(), header.header_value())
    }

    /// Execute a request exactly once
    async fn execute(&self, request: RequestBuilder) -> GitLabResult<Response> {
        let response = self
            .authenticate(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GitLabError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    warn!("Request failed: {}", e);
                    GitLabError::Request(e)
                }
            })?;

        self.handle_response(response).await
    }

    /// Handle API response
    async fn handle_response(&self, response: Response) -> GitLabResult<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(60);
            return Err(GitLabError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "GitLab returned an error status");
        Err(GitLabError::from_response(status.as_u16(), &body))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> GitLabResult<T> {
        response
            .json()
            .await
            .map_err(|e| GitLabError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Make a GET request
    #[instrument(skip(self), fields(credential = %self.credential.kind()))]
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> GitLabResult<T> {
        let response = self.execute(self.http.get(self.url(endpoint))).await?;
        Self::parse(response).await
    }

    /// Make a GET request returning raw JSON value
    pub async fn get_json(&self, endpoint: &str) -> GitLabResult<Value> {
        self.get(endpoint).await
    }

    /// Make a request with custom method and optional JSON body
    ///
    /// An empty response body (e.g. `204 No Content`) yields `Value::Null`.
    #[instrument(skip(self, body), fields(credential = %self.credential.kind()))]
    pub async fn request_json(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> GitLabResult<Value> {
        let mut request = self.http.request(method, self.url(endpoint));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.execute(request).await?;
        let text = response.text().await.map_err(|e| {
            GitLabError::InvalidResponse(format!("Failed to read response text: {}", e))
        })?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| GitLabError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Fetch one page, returning its items and the next page number
    #[instrument(skip(self), fields(credential = %self.credential.kind()))]
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        page: u32,
    ) -> GitLabResult<(Vec<T>, Option<u32>)> {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        let paged = format!(
            "{}{}page={}&per_page={}",
            endpoint, separator, page, PER_PAGE
        );

        let response = self.execute(self.http.get(self.url(&paged))).await?;
        let next = response
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());

        let items: Vec<T> = Self::parse(response).await?;
        Ok((items, next))
    }

    /// Lazily walk every page of a list endpoint
    ///
    /// Pages are requested as the stream is polled, following `x-next-page`.
    pub fn paginate<T>(&self, endpoint: &str) -> BoxStream<'_, GitLabResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let endpoint = endpoint.to_string();
        stream::try_unfold(Some(1u32), move |page| {
            let endpoint = endpoint.clone();
            async move {
                let Some(page) = page else {
                    return Ok::<_, GitLabError>(None);
                };
                let (items, next) = self.get_page::<T>(&endpoint, page).await?;
                let next = if items.is_empty() { None } else { next };
                Ok(Some((
                    stream::iter(items.into_iter().map(Ok::<T, GitLabError>)),
                    next,
                )))
            }
        })
        .try_flatten()
        .boxed()
    }

    /// URL-encode a project path for use in API endpoints
    pub fn encode_project(project: &str) -> String {
        urlencoding::encode(project).to_string()
    }
}
