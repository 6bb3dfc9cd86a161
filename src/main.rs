//! tanuki-gate
//!
//! GitLab MCP server with dual user and service-account authorization.

use clap::Parser;
use std::sync::Arc;
use tanuki_gate::{
    auth::{AuthState, Credential, IntrospectionVerifier, OAuthProxy, OAuthProxyConfig, TokenVerifier},
    broker::BrokerProvider,
    config::{AppConfig, LogFormat, load_config, load_secrets},
    gitlab::{GitLabClient, ResourceClient, build_http_client},
    server::GitLabMcpHandler,
    tools::ToolRegistry,
    transport::{build_router, run_http},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// GitLab MCP server authorizing every project operation as both the caller and a service account
#[derive(Parser, Debug)]
#[command(name = "tanuki-gate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TANUKI_GATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "TANUKI_GATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Load variables from this dotenv file before reading configuration
    #[arg(long)]
    env_file: Option<String>,
}

fn init_logging(config: &AppConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenvy::from_filename(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    // Logging depends on the config, so configuration errors go to stderr directly
    let config = load_config(args.config.as_deref()).inspect_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
    })?;

    init_logging(&config, args.log_level.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gitlab = %config.gitlab.base_url(),
        "Starting tanuki-gate"
    );

    let secrets = load_secrets(&config.secrets)
        .inspect_err(|e| error!(error = %e, "Failed to load secrets"))?;

    // One connection pool for GitLab API, introspection and OAuth upstream calls
    let http = build_http_client(&config.gitlab)
        .inspect_err(|e| error!(error = %e, "Failed to create HTTP client"))?;

    let service_credential = Credential::service(secrets.service_token.clone())
        .inspect_err(|e| error!(error = %e, "Invalid service token"))?;
    let service: Arc<dyn ResourceClient> = Arc::new(GitLabClient::new(
        http.clone(),
        &config.gitlab,
        service_credential,
    ));

    let brokers = Arc::new(BrokerProvider::new(
        service,
        http.clone(),
        config.gitlab.clone(),
    ));

    let verifier: Arc<dyn TokenVerifier> =
        Arc::new(IntrospectionVerifier::from_config(http.clone(), &config, &secrets));

    let proxy = Arc::new(OAuthProxy::new(
        OAuthProxyConfig::from_config(&config, &secrets),
        http,
    ));
    let auth = AuthState::new(verifier, proxy.config().resource_metadata_url());

    let registry = Arc::new(ToolRegistry::with_all_tools());
    let handler = GitLabMcpHandler::new(&config, registry, brokers);

    let ct = CancellationToken::new();
    let router = build_router(handler, auth, proxy, config.server.cors, &ct);

    run_http(router, &config.server, ct)
        .await
        .inspect_err(|e| error!(error = %e, "Server error"))?;

    Ok(())
}
