//! obcache server: remote-backed caches with a live introspection endpoint.
//!
//! Main entry point that builds the configured caches and starts the server.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use obcache_core::config::AppConfig;
use obcache_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("OBCACHE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    AppConfig::load(&config_path)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting obcache v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Build and register caches ────────────────────────
    tracing::info!(count = config.caches.len(), "Initializing caches...");
    let registry = Arc::new(obcache_cache::build_registry(&config.caches)?);
    tracing::info!(caches = ?registry.names(), "Caches registered");

    // ── Step 2: Serve introspection API until shutdown ───────────
    obcache_api::run_server(config, registry).await
}
