//! Remote-store cache backend.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use obcache_core::config::cache::CacheInstanceConfig;
use obcache_core::error::AppError;
use obcache_core::result::AppResult;
use obcache_core::stats::CacheStats;
use obcache_core::traits::cache::{CacheBackend, PendingReset};

use super::connection::RemoteConnector;
use super::manager::{Conn, ConnectionManager, ConnectionOptions};
use crate::keys::Namespace;

/// Cache backend for a remote key-value store.
///
/// Keys are namespaced as `obc:<id>:<key>`, values stored as JSON with a
/// whole-second TTL. Operations issued before the connection is usable are
/// held by the [`ConnectionManager`] and released in submission order.
/// Released operations are issued to the store in that same order by a
/// background task, so they complete even if the caller stops waiting.
#[derive(Debug)]
pub struct RemoteCache {
    namespace: Namespace,
    max_age: Duration,
    connection: Arc<ConnectionManager>,
    stats: CacheStats,
    /// Feeds [`issue_in_order`]; spawned on first use.
    issuer: OnceLock<mpsc::UnboundedSender<Issued>>,
}

/// A released operation, bound to its connection and result channel.
type Issued = BoxFuture<'static, ()>;

impl RemoteCache {
    /// Create a remote cache from configuration.
    ///
    /// Fails when the configured id is missing or not numeric. The
    /// connection is not attempted until [`start`](Self::start).
    pub fn new(config: &CacheInstanceConfig, connector: Arc<dyn RemoteConnector>) -> AppResult<Self> {
        let id = config.numeric_id()?;
        let options = ConnectionOptions {
            proxy_compat: config.redis.proxy_compat,
            reconnect_interval: Duration::from_millis(config.redis.reconnect_interval_ms),
        };

        Ok(Self {
            namespace: Namespace::for_id(id),
            max_age: Duration::from_millis(config.max_age_ms),
            connection: ConnectionManager::new(connector, options),
            stats: CacheStats::new(),
            issuer: OnceLock::new(),
        })
    }

    /// Begin connecting in the background.
    pub fn start(&self) -> JoinHandle<()> {
        self.connection.start()
    }

    /// The connection manager behind this cache.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Key namespace of this cache.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// TTL applied on write, in whole seconds (truncated).
    pub fn ttl_secs(&self) -> u64 {
        self.max_age.as_secs()
    }

    fn issuer(&self) -> &mpsc::UnboundedSender<Issued> {
        self.issuer.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(issue_in_order(rx));
            tx
        })
    }

    /// Route `op` through the readiness gate.
    ///
    /// The returned receiver resolves with the operation's result, or with
    /// the connection error if the gate failed it.
    fn dispatch<T, F, Fut>(&self, op: F) -> oneshot::Receiver<AppResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(Conn) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let manager = Arc::clone(&self.connection);
        let issuer = self.issuer().clone();

        self.connection.when_ready(Box::new(move |ready: AppResult<Conn>| match ready {
            Ok(conn) => {
                let issued: Issued = Box::pin(async move {
                    let result = op(conn).await;
                    if let Err(err) = &result {
                        manager.report_error(err);
                    }
                    let _ = tx.send(result);
                });
                // A closed issuer drops the operation; the caller sees it
                // as dropped before completion.
                let _ = issuer.send(issued);
            }
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        }));

        rx
    }
}

/// Drive released operations for one cache.
///
/// Operations are first polled in the order they arrive, which is the
/// order their commands reach the store. They then run concurrently and
/// may complete in any order.
async fn issue_in_order(mut released: mpsc::UnboundedReceiver<Issued>) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;
            next = released.recv() => match next {
                Some(op) => in_flight.push(op),
                None => break,
            },
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
        }
    }

    while in_flight.next().await.is_some() {}
}

/// Wait for a dispatched operation's result.
async fn settle<T>(rx: oneshot::Receiver<AppResult<T>>) -> AppResult<T> {
    rx.await
        .map_err(|_| AppError::internal("Remote operation dropped before completion"))?
}

#[async_trait]
impl CacheBackend for RemoteCache {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let full_key = self.namespace.key(key);
        debug!(key = %full_key, "Getting key from remote store");

        let rx = self.dispatch(move |conn| async move { conn.get(&full_key).await });

        match settle(rx).await? {
            Some(data) if !data.is_empty() => {
                let value = serde_json::from_str(&data)?;
                self.stats.record_hit();
                Ok(Some(value))
            }
            _ => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<Value> {
        let full_key = self.namespace.key(key);
        let payload = serde_json::to_string(&value)?;
        let ttl = self.ttl_secs();
        debug!(key = %full_key, ttl, "Setting key in remote store");

        let rx = self.dispatch(move |conn| async move {
            // A zero-second TTL would be rejected by the store; the entry
            // would be gone immediately anyway.
            if ttl == 0 {
                conn.expire(&full_key, 0).await
            } else {
                conn.set_with_ttl(&full_key, &payload, ttl).await
            }
        });

        settle(rx).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str) -> AppResult<()> {
        let full_key = self.namespace.key(key);
        debug!(key = %full_key, "Expiring key in remote store");

        let rx = self.dispatch(move |conn| async move { conn.expire(&full_key, 0).await });
        settle(rx).await
    }

    fn reset(&self) -> AppResult<PendingReset> {
        if self.connection.proxy_compat() {
            return Err(AppError::unsupported(
                "Reset is not possible in proxy compatibility mode",
            ));
        }

        info!(prefix = %self.namespace.prefix(), "Flushing remote keyspace");
        let rx = self.dispatch(|conn| async move { conn.flush().await });
        Ok(Box::pin(settle(rx)))
    }

    fn size(&self) -> u64 {
        0
    }

    fn keycount(&self) -> i64 {
        self.connection.keycount()
    }

    fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    fn pending(&self) -> usize {
        self.connection.pending()
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use obcache_core::error::ErrorKind;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::remote::manager::ConnectionState;
    use crate::remote::mock::{MockConnector, MockStore};

    fn config(id: u32, max_age_ms: u64) -> CacheInstanceConfig {
        let mut config = CacheInstanceConfig::redis(id);
        config.max_age_ms = max_age_ms;
        config
    }

    async fn connected(config: &CacheInstanceConfig) -> (Arc<RemoteCache>, Arc<MockStore>) {
        let store = MockStore::new();
        let cache = RemoteCache::new(config, Arc::new(MockConnector::new(Arc::clone(&store))))
            .unwrap();
        cache.connection().establish().await.unwrap();
        (Arc::new(cache), store)
    }

    #[test]
    fn test_rejects_missing_id() {
        let mut config = config(1, 1000);
        config.id = None;
        let store = MockStore::new();
        let err = RemoteCache::new(&config, Arc::new(MockConnector::new(store))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let (cache, store) = connected(&config(3, 2000)).await;

        let stored = cache.set("a", json!({"x": 1})).await.unwrap();
        assert_eq!(stored, json!({"x": 1}));
        assert_eq!(cache.get("a").await.unwrap(), Some(json!({"x": 1})));

        assert_eq!(store.entry("obc:3:a").as_deref(), Some(r#"{"x":1}"#));
        assert_eq!(store.ttl("obc:3:a"), Some(2));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_an_error() {
        let (cache, _store) = connected(&config(3, 2000)).await;

        assert_eq!(cache.get("nope").await.unwrap(), None);
        let stats = cache.stats().snapshot();
        assert_eq!(stats.miss, 1);
        assert_eq!(stats.hit, 0);
    }

    #[tokio::test]
    async fn test_get_malformed_payload_is_serialization_error() {
        let (cache, store) = connected(&config(3, 2000)).await;
        store.insert_raw("obc:3:bad", "{not json");

        let err = cache.get("bad").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }

    #[tokio::test]
    async fn test_ttl_truncates_to_whole_seconds() {
        let (cache, store) = connected(&config(5, 1999)).await;
        assert_eq!(cache.ttl_secs(), 1);

        cache.set("k", json!(true)).await.unwrap();
        assert_eq!(store.ttl("obc:5:k"), Some(1));
    }

    #[tokio::test]
    async fn test_sub_second_max_age_removes_instead_of_writing() {
        let (cache, store) = connected(&config(5, 500)).await;
        store.insert_raw("obc:5:k", "1");

        cache.set("k", json!(2)).await.unwrap();
        assert_eq!(store.entry("obc:5:k"), None);
        assert!(store.commands().contains(&"EXPIRE obc:5:k 0".to_string()));
    }

    #[tokio::test]
    async fn test_expire_removes_entry() {
        let (cache, store) = connected(&config(3, 2000)).await;
        cache.set("a", json!(1)).await.unwrap();

        cache.expire("a").await.unwrap();
        assert_eq!(store.entry("obc:3:a"), None);
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Page {
            title: String,
            views: u32,
        }

        let (cache, _store) = connected(&config(2, 60_000)).await;
        let page = Page {
            title: "home".to_string(),
            views: 12,
        };

        cache.set_as("home", &page).await.unwrap();
        let loaded: Option<Page> = cache.get_as("home").await.unwrap();
        assert_eq!(loaded, Some(page));
    }

    #[tokio::test]
    async fn test_unserializable_value_fails_before_queueing() {
        let store = MockStore::new();
        let (connector, _gate) = MockConnector::gated(store);
        let cache = RemoteCache::new(&config(1, 1000), Arc::new(connector)).unwrap();

        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);

        let err = cache.set_as("bad", &bad).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test]
    async fn test_operations_before_connect_run_in_order() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(Arc::clone(&store));
        let cache = Arc::new(RemoteCache::new(&config(3, 2000), Arc::new(connector)).unwrap());
        let connect = cache.start();

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.set("k", json!(1)).await }
        });
        let second = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.set("k", json!(2)).await }
        });
        let read = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get("k").await }
        });

        while cache.pending() < 3 {
            tokio::task::yield_now().await;
        }
        assert!(store.commands().is_empty());
        assert!(!cache.is_ready());

        gate.open();
        connect.await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), json!(1));
        assert_eq!(second.await.unwrap().unwrap(), json!(2));
        assert_eq!(read.await.unwrap().unwrap(), Some(json!(2)));

        let commands: Vec<String> = store
            .commands()
            .into_iter()
            .filter(|c| c != "DBSIZE")
            .collect();
        assert_eq!(
            commands,
            vec!["SETEX obc:3:k 2 1", "SETEX obc:3:k 2 2", "GET obc:3:k"]
        );
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_writes_reach_store_in_submission_order_on_worker_pool() {
        for _ in 0..25 {
            let store = MockStore::new();
            let (connector, gate) = MockConnector::gated(Arc::clone(&store));
            let cache = Arc::new(RemoteCache::new(&config(3, 2000), Arc::new(connector)).unwrap());
            let connect = cache.start();

            let mut writes = Vec::new();
            for i in 0..16 {
                writes.push(tokio::spawn({
                    let cache = Arc::clone(&cache);
                    async move { cache.set("k", json!(i)).await }
                }));
                while cache.pending() < i + 1 {
                    tokio::task::yield_now().await;
                }
            }

            gate.open();
            connect.await.unwrap();
            for write in writes {
                write.await.unwrap().unwrap();
            }

            let expected: Vec<String> = (0..16).map(|i| format!("SETEX obc:3:k 2 {i}")).collect();
            let issued: Vec<String> = store
                .commands()
                .into_iter()
                .filter(|c| c.starts_with("SETEX"))
                .collect();
            assert_eq!(issued, expected);
            assert_eq!(store.entry("obc:3:k").as_deref(), Some("15"));
        }
    }

    #[tokio::test]
    async fn test_released_operation_completes_after_caller_gives_up() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(Arc::clone(&store));
        let cache = Arc::new(RemoteCache::new(&config(3, 2000), Arc::new(connector)).unwrap());
        let connect = cache.start();

        let abandoned = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.set("k", json!("kept")).await }
        });
        while cache.pending() < 1 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        let _ = abandoned.await;

        gate.open();
        connect.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.entry("obc:3:k").is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(store.entry("obc:3:k").as_deref(), Some(r#""kept""#));
    }

    #[tokio::test]
    async fn test_failed_connect_delivers_error_to_each_queued_operation() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(Arc::clone(&store));
        let cache = Arc::new(RemoteCache::new(&config(3, 2000), Arc::new(connector)).unwrap());
        let connect = cache.start();

        let get = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get("a").await }
        });
        let set = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.set("a", json!(1)).await }
        });
        while cache.pending() < 2 {
            tokio::task::yield_now().await;
        }

        gate.fail("connection refused");
        connect.await.unwrap();

        assert_eq!(get.await.unwrap().unwrap_err().kind, ErrorKind::Connection);
        assert_eq!(set.await.unwrap().unwrap_err().kind, ErrorKind::Connection);
        assert_eq!(cache.pending(), 0);
        assert!(store.commands().is_empty());

        let err = cache.expire("a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_dropped_connection_surfaces_error_to_in_flight_caller() {
        let mut config = config(3, 2000);
        config.redis.reconnect_interval_ms = 10;
        let (cache, store) = connected(&config).await;

        store.set_offline(true);
        let err = cache.get("a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Connection);
        assert_eq!(cache.connection().state(), ConnectionState::Disconnected);

        let parked = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.set("a", json!("back")).await }
        });
        while cache.pending() < 1 {
            tokio::task::yield_now().await;
        }

        store.set_offline(false);
        let stored = tokio::time::timeout(Duration::from_secs(2), parked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stored, json!("back"));
        assert_eq!(store.entry("obc:3:a").as_deref(), Some(r#""back""#));
    }

    #[tokio::test]
    async fn test_reset_flushes_keyspace() {
        let (cache, store) = connected(&config(3, 2000)).await;
        cache.set("a", json!(1)).await.unwrap();

        cache.reset().unwrap().await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(store.commands().contains(&"FLUSHDB".to_string()));
    }

    #[tokio::test]
    async fn test_proxy_compat_reset_fails_without_contacting_store() {
        let mut config = config(3, 2000);
        config.redis.proxy_compat = true;
        let (cache, store) = connected(&config).await;

        let err = match cache.reset() {
            Ok(_) => panic!("reset must be refused in proxy compatibility mode"),
            Err(err) => err,
        };
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(cache.keycount(), -1);
        assert!(!store.commands().iter().any(|c| c == "FLUSHDB"));
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test]
    async fn test_size_is_always_zero() {
        let (cache, store) = connected(&config(3, 2000)).await;
        store.insert_raw("obc:3:x", "1");
        assert_eq!(cache.size(), 0);
        assert!(cache.values().is_none());
    }
}
