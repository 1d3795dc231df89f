//! Lookout server library.
//!
//! Provides a reusable server function to serve Lookout either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod auth;
mod cache;
mod error;
mod health;
mod rate_limit;
mod routes;
mod state;
mod upload;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use ::rate_limit::{AdmissionGate, QuotaEnforcer};
use anyhow::anyhow;
use axum_server::tls_rustls::RustlsConfig;
use cache::PredictionCache;
use config::Config;
use detector::HttpDetector;
use retention::RetentionSweeper;
use state::AppState;
use storage::{ImageKind, SqliteStore};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// How often idle admission windows are dropped.
const COMPACTION_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for serving Lookout.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Lookout TOML configuration.
    pub config: Config,
    /// Cancelled to stop the listener and every background task.
    pub shutdown: CancellationToken,
}

/// Starts and runs the Lookout server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown,
    }: ServeConfig,
) -> anyhow::Result<()> {
    config.validate()?;

    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .map_err(|e| anyhow!("Failed to open the prediction store at {}: {e}", config.database.url))?;

    let store = Arc::new(store);

    let upload_root = PathBuf::from(&config.retention.upload_root);

    for kind in [ImageKind::Original, ImageKind::Predicted] {
        let dir = upload_root.join(kind.as_str());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow!("Failed to create upload directory {}: {e}", dir.display()))?;
    }

    let detector = HttpDetector::new(&config.detector).map_err(|e| anyhow!("Failed to build detector client: {e}"))?;

    let state = AppState {
        store: store.clone(),
        quota: Arc::new(QuotaEnforcer::new(store.clone(), &config.quota)),
        detector: Arc::new(detector),
        cache: PredictionCache::new(&config.cache),
        upload_root: Arc::new(upload_root),
        max_upload_bytes: config.uploads.max_bytes,
    };

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let gate = if config.server.rate_limits.enabled {
        log::debug!("Initializing admission gate with configured limits");
        let gate = Arc::new(AdmissionGate::new(&config.server.rate_limits));

        tasks.push(gate.clone().spawn_compaction(COMPACTION_INTERVAL, shutdown.clone()));

        Some(gate)
    } else {
        log::debug!("Rate limiting disabled - no admission gate created");
        None
    };

    if config.retention.enabled {
        let sweeper = RetentionSweeper::new(store.clone(), &config.retention);
        tasks.push(sweeper.spawn(shutdown.clone()));
    } else {
        log::debug!("Retention sweep disabled");
    }

    let mut app = routes::router(state, gate);

    // The health route sits outside the admission gate.
    if let Some(listen) = config.server.health.dedicated_listener() {
        tokio::spawn(health::bind_health_endpoint(
            listen,
            config.server.tls.clone(),
            config.server.health.clone(),
            store.clone(),
            shutdown.clone(),
        ));
    } else if let Some(path) = config.server.health.shared_path() {
        app = app.merge(health::router(path, store.clone()));
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let result = match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            log::info!("Lookout available at: https://{listen_address}");

            let handle = axum_server::Handle::new();
            tokio::spawn(health::graceful_shutdown(handle.clone(), shutdown.clone()));

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .handle(handle)
                .serve(make_service)
                .await
                .map_err(|e| anyhow!("Failed to start HTTPS server: {e}"))
        }
        None => {
            log::info!("Lookout available at: http://{listen_address}");

            axum::serve(listener, make_service)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server: {}", e))
        }
    };

    // Stop the background tasks even when the listener failed on its own.
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            log::warn!("Background task ended abnormally: {e}");
        }
    }

    store.close().await;
    log::info!("Lookout stopped");

    result
}
