//! Configuration types for tanuki-gate
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables. Secret material lives in a
//! separate JSON file referenced by `[secrets] path`.

use crate::util::SecretString;
use serde::Deserialize;
use std::path::PathBuf;

/// Default location of the secrets file
pub const DEFAULT_SECRETS_PATH: &str = "/run/secrets/gitlab.json";

/// Scopes every caller token must carry
pub const DEFAULT_REQUIRED_SCOPES: &[&str] = &["read_user", "read_api", "read_repository"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// GitLab connection settings
    pub gitlab: GitLabConfig,

    /// Location of the secrets file
    pub secrets: SecretsConfig,

    /// OAuth front settings
    pub oauth: OAuthConfig,

    /// Server/transport settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// GitLab connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// GitLab instance URL (e.g., `https://gitlab.example.com`)
    pub url: String,

    /// API version (default: "v4")
    pub api_version: String,

    /// Request timeout in seconds, applied to every upstream call
    pub timeout_secs: u64,

    /// Extra CA certificate (PEM) to trust for the GitLab instance
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Custom User-Agent header
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_version: "v4".to_string(),
            timeout_secs: 30,
            ca_cert_path: None,
            user_agent: None,
        }
    }
}

impl GitLabConfig {
    /// Instance URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Get the full API base URL
    pub fn api_url(&self) -> String {
        format!("{}/api/{}", self.base_url(), self.api_version)
    }

    /// Upstream OAuth authorization endpoint
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", self.base_url())
    }

    /// Upstream OAuth token endpoint
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url())
    }

    /// Upstream OAuth token introspection endpoint
    pub fn introspection_url(&self) -> String {
        format!("{}/oauth/introspect", self.base_url())
    }
}

/// Where to find the secrets file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub path: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SECRETS_PATH),
        }
    }
}

/// Contents of the secrets file
#[derive(Debug, Clone, Deserialize)]
pub struct Secrets {
    /// Client id of the OAuth application registered on GitLab
    pub oauth_client_id: String,

    /// Client secret of the OAuth application registered on GitLab
    pub oauth_client_secret: SecretString,

    /// Access token of the service account
    pub service_token: SecretString,
}

/// OAuth front configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Externally reachable base URL of this service, with explicit port
    /// (e.g., `https://mcp.example.com:443`)
    pub base_url: String,

    /// Callback path under `base_url` registered on the GitLab application
    pub redirect_path: String,

    /// Scopes requested upstream and required on every caller token
    pub required_scopes: Vec<String>,

    /// Allow a plain-http base URL
    pub local_dev: bool,

    /// Lifetime of a pending authorization in seconds
    pub pending_ttl_secs: u64,

    /// Seconds a registered client may stay unused before it is forgotten
    pub client_ttl_secs: u64,

    /// Upper bound on registered clients kept in memory
    pub max_clients: usize,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            redirect_path: "callback".to_string(),
            required_scopes: DEFAULT_REQUIRED_SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            local_dev: false,
            pending_ttl_secs: 600,
            client_ttl_secs: 7 * 24 * 60 * 60,
            max_clients: 1000,
        }
    }
}

impl OAuthConfig {
    /// Base URL without a trailing slash
    pub fn public_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Absolute callback URL registered upstream
    pub fn callback_url(&self) -> String {
        format!(
            "{}/{}",
            self.public_url(),
            self.redirect_path.trim_start_matches('/')
        )
    }

    /// Route path of the callback handler
    pub fn callback_route(&self) -> String {
        format!("/{}", self.redirect_path.trim_start_matches('/'))
    }
}

/// Server/transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP host
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// Server name for MCP
    pub name: String,

    /// Server version for MCP
    pub version: String,

    /// PEM certificate chain for serving HTTPS
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,

    /// PEM private key for serving HTTPS
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,

    /// CORS policy for browser-based clients
    pub cors: CorsMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            name: "tanuki-gate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            cors: CorsMode::default(),
        }
    }
}

impl ServerConfig {
    /// Whether TLS material is configured
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }
}

/// CORS policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorsMode {
    /// No CORS headers
    #[default]
    Disabled,
    /// Allow any origin
    Permissive,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
