//! Streamable HTTP transport
//!
//! Serves the MCP endpoint at `/mcp` behind bearer authentication, next to
//! the public OAuth front and a health probe. HTTPS is used when the server
//! config names both a certificate and a key.

use crate::auth::middleware::{AuthState, require_principal};
use crate::auth::oauth::{self, OAuthProxy};
use crate::config::{CorsMode, ServerConfig};
use crate::error::TransportError;
use crate::server::GitLabMcpHandler;
use axum::routing::get;
use axum::{Json, Router, middleware};
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Time allowed for in-flight requests after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the full application router
///
/// The OAuth routes and `/health` are public; everything under `/mcp`
/// requires a verified bearer token.
pub fn build_router(
    handler: GitLabMcpHandler,
    auth: AuthState,
    proxy: Arc<OAuthProxy>,
    cors: CorsMode,
    ct: &CancellationToken,
) -> Router {
    let mcp_service = StreamableHttpService::new(
        move || {
            debug!("Creating handler instance for MCP session");
            Ok(handler.clone())
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(30)),
            cancellation_token: ct.child_token(),
            ..Default::default()
        },
    );

    let mcp_routes = Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(middleware::from_fn_with_state(auth, require_principal));

    let router = Router::new()
        .route("/health", get(health))
        .merge(oauth::router(proxy))
        .merge(mcp_routes)
        .layer(TraceLayer::new_for_http());

    match cors {
        CorsMode::Permissive => router.layer(CorsLayer::permissive()),
        CorsMode::Disabled => router,
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Resolve the configured bind address
pub fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, TransportError> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| TransportError::InvalidAddress(format!("{}:{}", config.host, config.port)))
}

/// Serve the router until Ctrl+C
///
/// Cancelling `ct` closes open MCP sessions once the listener stops.
pub async fn run_http(
    router: Router,
    config: &ServerConfig,
    ct: CancellationToken,
) -> Result<(), TransportError> {
    let addr = bind_addr(config)?;

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                .await
                .map_err(|e| TransportError::Tls(e.to_string()))?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                wait_for_shutdown().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!(%addr, "HTTPS server listening");
            info!("  MCP endpoint: https://{}/mcp", addr);

            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        (None, None) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;

            info!(addr = %listener.local_addr()?, "HTTP server listening");
            info!("  MCP endpoint: http://{}/mcp", addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(wait_for_shutdown())
                .await?;
        }
        _ => {
            return Err(TransportError::Tls(
                "both tls_cert_path and tls_key_path must be set".into(),
            ));
        }
    }

    ct.cancel();
    info!("HTTP server stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

/// Resolve once `signal` fires; never resolve if it cannot be listened for
async fn wait_for_signal(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await
        }
    }
}
