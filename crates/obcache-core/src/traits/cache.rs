//! Capability trait shared by every cache backend.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::result::AppResult;
use crate::stats::CacheStats;

/// A flush that has been accepted by a backend but may not have reached the
/// store yet.
pub type PendingReset = BoxFuture<'static, AppResult<()>>;

/// Trait for cache backends (remote store, in-memory, ...).
///
/// The registry and the introspection view only ever see this trait, never
/// a concrete backend. Backends are responsible for key namespacing and TTL
/// enforcement, and own their hit/miss/reset counters.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Store a value with the backend's default TTL. Returns the value as given.
    async fn set(&self, key: &str, value: Value) -> AppResult<Value>;

    /// Expire a key immediately.
    async fn expire(&self, key: &str) -> AppResult<()>;

    /// Flush every entry visible to this backend.
    ///
    /// Refusals (e.g. a shared keyspace) are returned directly, before any
    /// store is contacted. The returned future resolves once the flush ran.
    fn reset(&self) -> AppResult<PendingReset>;

    /// Approximate size of the cached data.
    fn size(&self) -> u64;

    /// Approximate number of keys, or `-1` when the backend cannot tell.
    fn keycount(&self) -> i64;

    /// Whether operations can currently be served without waiting.
    fn is_ready(&self) -> bool;

    /// Number of operations waiting for the backend to become ready.
    fn pending(&self) -> usize {
        0
    }

    /// Dump of all entries, for backends that can enumerate cheaply.
    fn values(&self) -> Option<Map<String, Value>> {
        None
    }

    /// Hit/miss/reset counters for this backend.
    fn stats(&self) -> &CacheStats;

    /// Get a typed value by deserializing from JSON.
    async fn get_as<T: serde::de::DeserializeOwned + Send>(&self, key: &str) -> AppResult<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key).await? {
            Some(value) => {
                let parsed = serde_json::from_value(value)?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Set a typed value by serializing to JSON.
    ///
    /// Serialization happens before the backend is touched, so an
    /// unencodable value fails without queueing anything.
    async fn set_as<T: serde::Serialize + Send + Sync>(&self, key: &str, value: &T) -> AppResult<()>
    where
        Self: Sized,
    {
        let json = serde_json::to_value(value)?;
        self.set(key, json).await?;
        Ok(())
    }
}
