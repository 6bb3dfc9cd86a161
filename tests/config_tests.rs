//! Configuration loading tests
//!
//! Environment-variable tests mutate process state and run serially.

use serial_test::serial;
use std::io::Write;
use tanuki_gate::config::{CorsMode, LogFormat, load_config, load_config_from_str, load_secrets};
use tanuki_gate::error::ConfigError;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[server]
name = "tanuki-gate-test"
host = "0.0.0.0"
port = 9000
cors = "permissive"

[gitlab]
url = "https://gitlab.company.com/"
timeout_secs = 60
user_agent = "gate-test"

[secrets]
path = "/tmp/gitlab.json"

[oauth]
base_url = "https://mcp.company.com:8443/"
redirect_path = "/oauth/callback"
required_scopes = ["read_api", "read_user"]

[logging]
level = "debug"
format = "json"
"#;

const ENV_VARS: &[&str] = &[
    "GITLAB_URL",
    "GITLAB_SECRETS_PATH",
    "GITLAB_CA_CERT_PATH",
    "TANUKI_GATE_SERVER__PORT",
    "TANUKI_GATE_OAUTH__REQUIRED_SCOPES",
];

fn clear_env() {
    for var in ENV_VARS {
        // SAFETY: env tests are serialized with #[serial]
        unsafe { std::env::remove_var(var) };
    }
}

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config() {
    let config = load_config_from_str(FULL_CONFIG).unwrap();

    assert_eq!(config.server.name, "tanuki-gate-test");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.cors, CorsMode::Permissive);
    assert!(!config.server.tls_enabled());

    assert_eq!(config.gitlab.base_url(), "https://gitlab.company.com");
    assert_eq!(config.gitlab.api_url(), "https://gitlab.company.com/api/v4");
    assert_eq!(config.gitlab.timeout_secs, 60);

    assert_eq!(config.oauth.public_url(), "https://mcp.company.com:8443");
    assert_eq!(
        config.oauth.callback_url(),
        "https://mcp.company.com:8443/oauth/callback"
    );
    assert_eq!(config.oauth.callback_route(), "/oauth/callback");
    assert_eq!(config.oauth.required_scopes, vec!["read_api", "read_user"]);

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_defaults() {
    let config = load_config_from_str(
        r#"
[gitlab]
url = "https://gitlab.example.com"

[oauth]
base_url = "https://mcp.example.com:443"
"#,
    )
    .unwrap();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.cors, CorsMode::Disabled);
    assert_eq!(config.gitlab.timeout_secs, 30);
    assert_eq!(
        config.secrets.path.to_str(),
        Some("/run/secrets/gitlab.json")
    );
    assert_eq!(
        config.oauth.required_scopes,
        vec!["read_user", "read_api", "read_repository"]
    );
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_base_url_without_port_rejected() {
    let result = load_config_from_str(
        r#"
[gitlab]
url = "https://gitlab.example.com"

[oauth]
base_url = "https://mcp.example.com"
"#,
    );
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[test]
fn test_plain_http_base_url_needs_local_dev() {
    let toml = |local_dev: bool| {
        format!(
            r#"
[gitlab]
url = "http://localhost:8080"

[oauth]
base_url = "http://localhost:8000"
local_dev = {}
"#,
            local_dev
        )
    };

    assert!(load_config_from_str(&toml(false)).is_err());
    assert!(load_config_from_str(&toml(true)).is_ok());
}

#[test]
fn test_empty_required_scopes_rejected() {
    let result = load_config_from_str(
        r#"
[gitlab]
url = "https://gitlab.example.com"

[oauth]
base_url = "https://mcp.example.com:443"
required_scopes = []
"#,
    );
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_load_config_from_explicit_file() {
    clear_env();
    let file = write_file(FULL_CONFIG);

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.server.port, 9000);
}

#[test]
#[serial]
fn test_explicit_file_must_exist() {
    clear_env();
    let result = load_config(Some("/definitely/not/here.toml"));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
#[serial]
fn test_conventional_env_overrides_file() {
    clear_env();
    let file = write_file(FULL_CONFIG);

    // SAFETY: env tests are serialized with #[serial]
    unsafe {
        std::env::set_var("GITLAB_URL", "https://gitlab.override.com");
        std::env::set_var("GITLAB_SECRETS_PATH", "/etc/gate/secrets.json");
    }

    let config = load_config(file.path().to_str());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.gitlab.url, "https://gitlab.override.com");
    assert_eq!(config.secrets.path.to_str(), Some("/etc/gate/secrets.json"));
}

#[test]
#[serial]
fn test_prefixed_env_overrides_file() {
    clear_env();
    let file = write_file(FULL_CONFIG);

    // SAFETY: env tests are serialized with #[serial]
    unsafe {
        std::env::set_var("TANUKI_GATE_SERVER__PORT", "9100");
        std::env::set_var("TANUKI_GATE_OAUTH__REQUIRED_SCOPES", "api,read_user");
    }

    let config = load_config(file.path().to_str());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.oauth.required_scopes, vec!["api", "read_user"]);
}

#[test]
fn test_secrets_file_roundtrip_is_redacted() {
    let file = write_file(
        r#"{
            "oauth_client_id": "app-id",
            "oauth_client_secret": "app-secret",
            "service_token": "glpat-service"
        }"#,
    );

    let mut config = load_config_from_str(FULL_CONFIG).unwrap();
    config.secrets.path = file.path().to_path_buf();

    let secrets = load_secrets(&config.secrets).unwrap();
    assert_eq!(secrets.oauth_client_id, "app-id");
    assert_eq!(secrets.service_token.expose_secret(), "glpat-service");

    let debug = format!("{:?}", secrets);
    assert!(!debug.contains("app-secret"));
    assert!(!debug.contains("glpat-service"));
}

#[test]
fn test_malformed_secrets_file() {
    let file = write_file("{ not json");
    let mut config = load_config_from_str(FULL_CONFIG).unwrap();
    config.secrets.path = file.path().to_path_buf();

    assert!(matches!(
        load_secrets(&config.secrets),
        Err(ConfigError::Secrets { .. })
    ));
}
