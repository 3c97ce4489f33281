//! In-memory cache implementation using the moka crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{Map, Value};
use tracing::debug;

use obcache_core::config::cache::CacheInstanceConfig;
use obcache_core::result::AppResult;
use obcache_core::stats::CacheStats;
use obcache_core::traits::cache::{CacheBackend, PendingReset};

/// In-process cache backend.
///
/// Entries live for `max_age` after being written. The backend is always
/// ready and can dump its contents for the introspection view.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    /// The underlying moka cache.
    cache: Cache<String, Value>,
    /// Write TTL. Zero means writes are discarded.
    max_age: Duration,
    stats: Arc<CacheStats>,
}

impl MemoryCache {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &CacheInstanceConfig) -> Self {
        let max_age = Duration::from_millis(config.max_age_ms);

        let mut builder = Cache::builder().max_capacity(config.memory.max_capacity);
        if !max_age.is_zero() {
            builder = builder.time_to_live(max_age);
        }

        Self {
            cache: builder.build(),
            max_age,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Apply pending evictions and expirations so counts are exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        match self.cache.get(key).await {
            Some(value) => {
                self.stats.record_hit();
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<Value> {
        if self.max_age.is_zero() {
            self.cache.invalidate(key).await;
            return Ok(value);
        }
        self.cache.insert(key.to_string(), value.clone()).await;
        Ok(value)
    }

    async fn expire(&self, key: &str) -> AppResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    fn reset(&self) -> AppResult<PendingReset> {
        debug!(entries = self.cache.entry_count(), "Invalidating in-memory cache");
        self.cache.invalidate_all();
        Ok(Box::pin(async { Ok(()) }))
    }

    fn size(&self) -> u64 {
        self.cache.entry_count()
    }

    fn keycount(&self) -> i64 {
        i64::try_from(self.cache.entry_count()).unwrap_or(i64::MAX)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn values(&self) -> Option<Map<String, Value>> {
        let dump = self
            .cache
            .iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        Some(dump)
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
