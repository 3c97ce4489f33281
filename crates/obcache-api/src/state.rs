//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Duration;

use obcache_cache::inspect::Inspector;
use obcache_cache::registry::CacheRegistry;
use obcache_core::config::AppConfig;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Every live cache instance
    pub registry: Arc<CacheRegistry>,
    /// Introspection view over `registry`
    pub inspector: Arc<Inspector>,
}

impl AppState {
    /// Assemble state around an already-populated registry.
    pub fn new(config: AppConfig, registry: Arc<CacheRegistry>) -> Self {
        let flush_timeout = Duration::from_millis(config.server.flush_timeout_ms);
        let inspector = Inspector::new(Arc::clone(&registry), flush_timeout);

        Self {
            config: Arc::new(config),
            registry,
            inspector: Arc::new(inspector),
        }
    }
}
