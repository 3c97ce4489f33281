//! Builds cache backends from configuration.

use std::sync::Arc;

use tracing::info;

use obcache_core::config::cache::{BackendKind, CacheInstanceConfig};
use obcache_core::error::AppError;
use obcache_core::result::AppResult;
use obcache_core::traits::cache::CacheBackend;

use crate::registry::CacheRegistry;

/// Construct the configured backend.
///
/// Remote backends begin connecting immediately in the background, so this
/// must be called from within a Tokio runtime. Operations issued before the
/// connection settles are held and released in order.
pub fn build_cache(config: &CacheInstanceConfig) -> AppResult<Arc<dyn CacheBackend>> {
    let cache: Arc<dyn CacheBackend> = match config.backend {
        #[cfg(feature = "redis-backend")]
        BackendKind::Redis => {
            let id = config.numeric_id()?;
            let connector = crate::redis::RedisConnector::new(
                &config.redis,
                config.redis.database_for(id),
            );
            info!(
                id,
                store = %crate::redis::client::mask_redis_url(connector.url()),
                proxy_compat = config.redis.proxy_compat,
                "Initializing remote cache"
            );
            let cache = crate::remote::RemoteCache::new(config, Arc::new(connector))?;
            cache.start();
            Arc::new(cache)
        }
        #[cfg(feature = "memory")]
        BackendKind::Memory => {
            info!(max_capacity = config.memory.max_capacity, "Initializing in-memory cache");
            Arc::new(crate::memory::MemoryCache::new(config))
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(AppError::configuration(format!(
                "Cache backend '{other:?}' is not compiled into this build"
            )));
        }
    };

    Ok(cache)
}

/// Build every configured cache and register it.
pub fn build_registry(configs: &[CacheInstanceConfig]) -> AppResult<CacheRegistry> {
    let registry = CacheRegistry::new();
    for config in configs {
        let cache = build_cache(config)?;
        let name = registry.register_dyn(cache, config.name.as_deref());
        info!(cache = %name, backend = ?config.backend, "Cache registered");
    }
    Ok(registry)
}
