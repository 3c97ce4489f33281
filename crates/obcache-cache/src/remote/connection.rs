//! Transport seam between the remote cache and the store client.

use std::sync::Arc;

use async_trait::async_trait;

use obcache_core::result::AppResult;

/// One established connection to a remote key-value store.
///
/// Errors that mean the connection is unusable must carry
/// [`ErrorKind::Connection`](obcache_core::error::ErrorKind::Connection);
/// anything else is treated as a per-command failure.
#[async_trait]
pub trait RemoteConnection: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the raw value stored under `key`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl_secs` (at least 1).
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;

    /// Change the TTL of `key`. A TTL of zero removes it.
    async fn expire(&self, key: &str, ttl_secs: u64) -> AppResult<()>;

    /// Remove every key in the selected keyspace.
    async fn flush(&self) -> AppResult<()>;

    /// Number of keys in the selected keyspace.
    async fn size(&self) -> AppResult<u64>;

    /// Round-trip check used to detect recovery after a dropped connection.
    async fn ping(&self) -> AppResult<()>;
}

/// Factory for [`RemoteConnection`]s.
#[async_trait]
pub trait RemoteConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Establish a connection. Failures carry `ErrorKind::Connection`.
    async fn connect(&self) -> AppResult<Arc<dyn RemoteConnection>>;

    /// Target description safe for logs (no credentials).
    fn describe(&self) -> String;
}
