use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use config::{HealthConfig, TlsServerConfig};

use axum::{Json, Router, extract::State, routing::get};
use http::StatusCode;
use storage::SqliteStore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    /// Indicates that the server is healthy and operational.
    Healthy,

    /// Indicates that the prediction store cannot be reached.
    Unhealthy,
}

/// Handles health check requests and returns the current health status of the server.
pub(crate) async fn health(State(store): State<Arc<SqliteStore>>) -> (StatusCode, Json<HealthState>) {
    match store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthState::Healthy)),
        Err(e) => {
            log::warn!("Health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthState::Unhealthy))
        }
    }
}

/// The health route alone, for mounting on the main listener.
pub(crate) fn router(path: &str, store: Arc<SqliteStore>) -> Router {
    Router::new().route(path, get(health)).with_state(store)
}

/// Binds the health check endpoint to the specified address and configuration.
pub(super) async fn bind_health_endpoint(
    addr: SocketAddr,
    tls_config: Option<TlsServerConfig>,
    health_config: HealthConfig,
    store: Arc<SqliteStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let scheme = if tls_config.is_some() { "https" } else { "http" };
    let path = &health_config.path;
    let app = router(path, store).into_make_service();

    let handle = axum_server::Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone(), shutdown));

    log::info!("Health check endpoint exposed at {scheme}://{addr}{path}");

    match tls_config {
        Some(tls) => {
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {}", e))?;

            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app)
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?;
        }
        None => axum_server::bind(addr)
            .handle(handle)
            .serve(app)
            .await
            .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?,
    }

    Ok(())
}

/// Stops an `axum-server` listener once `shutdown` is cancelled.
pub(crate) async fn graceful_shutdown(handle: axum_server::Handle, shutdown: CancellationToken) {
    shutdown.cancelled().await;
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
