//! Application builder: wires router + middleware + state into an Axum app.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tracing::{error, info, warn};

use obcache_cache::registry::CacheRegistry;
use obcache_core::config::AppConfig;
use obcache_core::error::{AppError, ErrorKind};

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Serve the introspection API until a shutdown signal arrives.
pub async fn run_server(config: AppConfig, registry: Arc<CacheRegistry>) -> Result<(), AppError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(config, Arc::clone(&registry));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Internal, format!("Failed to bind {addr}"), e)
        })?;

    info!(addr = %addr, "obcache server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    wait_for_pending(&registry, grace).await;
    info!("obcache server shut down gracefully");
    Ok(())
}

/// Give operations still parked behind a connection up to `grace` to be
/// released before the process exits.
pub async fn wait_for_pending(registry: &CacheRegistry, grace: Duration) {
    let pending = || -> usize {
        registry
            .entries()
            .iter()
            .map(|(_, backend)| backend.pending())
            .sum()
    };

    if pending() == 0 {
        return;
    }

    info!(pending = pending(), "Waiting for deferred cache operations");
    let drained = tokio::time::timeout(grace, async {
        while pending() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_err() {
        warn!(pending = pending(), "Exiting with deferred cache operations outstanding");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
