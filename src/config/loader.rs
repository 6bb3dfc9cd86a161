//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Conventional GitLab variables (`GITLAB_URL`, `GITLAB_SECRETS_PATH`,
//!    `GITLAB_CA_CERT_PATH`)
//! 2. Environment variables (TANUKI_GATE_*)
//! 3. Configuration file (TOML)
//! 4. Default values

use crate::config::types::{AppConfig, Secrets, SecretsConfig};
use crate::error::ConfigError;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use std::path::Path;
use tracing::debug;
use url::Url;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "tanuki-gate.toml",
    ".tanuki-gate.toml",
    "~/.config/tanuki-gate/config.toml",
    "/etc/tanuki-gate/config.toml",
];

/// Conventional variables mapped onto nested keys
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("GITLAB_URL", "gitlab.url"),
    ("GITLAB_SECRETS_PATH", "secrets.path"),
    ("GITLAB_CA_CERT_PATH", "gitlab.ca_cert_path"),
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                debug!(path = %expanded, "Using configuration file");
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // e.g., TANUKI_GATE_GITLAB__URL, TANUKI_GATE_OAUTH__BASE_URL
    // Double underscore (__) maps to nested keys (gitlab.url)
    builder = builder.add_source(
        Environment::with_prefix("TANUKI_GATE")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("oauth.required_scopes")
            .try_parsing(true),
    );

    builder = apply_env_overrides(builder)?;

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn apply_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            builder = builder
                .set_override(*key, value)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
        }
    }
    Ok(builder)
}

/// Read the secrets file referenced by the configuration
pub fn load_secrets(config: &SecretsConfig) -> Result<Secrets, ConfigError> {
    let path = config.path.display().to_string();
    let secrets_error = |reason: String| ConfigError::Secrets {
        path: path.clone(),
        reason,
    };

    if !config.path.exists() {
        return Err(secrets_error("file not found".to_string()));
    }

    let raw = std::fs::read_to_string(&config.path)?;
    let secrets: Secrets =
        serde_json::from_str(&raw).map_err(|e| secrets_error(e.to_string()))?;

    if secrets.oauth_client_id.trim().is_empty() {
        return Err(secrets_error("oauth_client_id is empty".to_string()));
    }
    if secrets.oauth_client_secret.expose_secret().is_empty() {
        return Err(secrets_error("oauth_client_secret is empty".to_string()));
    }
    if secrets.service_token.expose_secret().is_empty() {
        return Err(secrets_error("service_token is empty".to_string()));
    }

    Ok(secrets)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    // Validate GitLab URL
    if config.gitlab.url.is_empty() {
        return Err(ConfigError::Missing {
            field: "gitlab.url (set GITLAB_URL environment variable)".to_string(),
        });
    }

    if !config.gitlab.url.starts_with("http://") && !config.gitlab.url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!(
                "gitlab.url must start with http:// or https://, got: {}",
                config.gitlab.url
            ),
        });
    }

    if let Some(ca) = &config.gitlab.ca_cert_path
        && !ca.exists()
    {
        return Err(ConfigError::Invalid {
            message: format!("CA certificate file not found: {}", ca.display()),
        });
    }

    // Validate timeout
    if config.gitlab.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "gitlab.timeout_secs must be greater than 0".to_string(),
        });
    }

    // Validate port
    if config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    if config.server.tls_cert_path.is_some() != config.server.tls_key_path.is_some() {
        return Err(ConfigError::Invalid {
            message: "server.tls_cert_path and server.tls_key_path must be set together"
                .to_string(),
        });
    }

    validate_base_url(&config.oauth.base_url, config.oauth.local_dev)?;

    if config.oauth.redirect_path.trim_matches('/').is_empty() {
        return Err(ConfigError::Missing {
            field: "oauth.redirect_path".to_string(),
        });
    }

    if config.oauth.required_scopes.is_empty() {
        return Err(ConfigError::Invalid {
            message: "oauth.required_scopes must name at least one scope".to_string(),
        });
    }

    if config.oauth.pending_ttl_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "oauth.pending_ttl_secs must be greater than 0".to_string(),
        });
    }

    if config.oauth.max_clients == 0 {
        return Err(ConfigError::Invalid {
            message: "oauth.max_clients must be greater than 0".to_string(),
        });
    }

    Ok(())
}

/// The public base URL must be https outside local development and must
/// always spell out its port.
pub fn validate_base_url(base_url: &str, local_dev: bool) -> Result<(), ConfigError> {
    if base_url.is_empty() {
        return Err(ConfigError::Missing {
            field: "oauth.base_url".to_string(),
        });
    }

    let parsed = Url::parse(base_url).map_err(|e| ConfigError::Invalid {
        message: format!("oauth.base_url is not a valid URL ({}): {}", e, base_url),
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" if local_dev => {}
        other => {
            return Err(ConfigError::Invalid {
                message: format!(
                    "oauth.base_url must use https unless oauth.local_dev is enabled, got: {}",
                    other
                ),
            });
        }
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::Invalid {
            message: format!("oauth.base_url has no host: {}", base_url),
        });
    }

    // `Url::port` hides default ports, so read the authority as written
    if explicit_port(base_url).is_none() {
        return Err(ConfigError::Invalid {
            message: format!(
                "oauth.base_url must include an explicit port (e.g. https://host:443), got: {}",
                base_url
            ),
        });
    }

    Ok(())
}

/// Port written in the authority section of `raw`, if any
fn explicit_port(raw: &str) -> Option<u16> {
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    let port = if host_port.starts_with('[') {
        let (_, after) = host_port.split_once(']')?;
        after.strip_prefix(':')?
    } else {
        host_port.rsplit_once(':')?.1
    };

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}
