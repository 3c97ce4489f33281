//! Connection lifecycle and readiness gate for a remote cache.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use obcache_core::error::AppError;
use obcache_core::result::AppResult;

use super::connection::{RemoteConnection, RemoteConnector};
use super::queue::{Continuation, DeferredQueue};

/// Shared handle to a live connection.
pub type Conn = Arc<dyn RemoteConnection>;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First (or retried) connection attempt in flight. Operations queue.
    Connecting,
    /// Connection usable. Operations run immediately.
    Connected,
    /// Connection dropped after having been established. Operations queue
    /// until a readiness probe succeeds.
    Disconnected,
    /// The connection attempt failed. Operations fail immediately until
    /// [`ConnectionManager::establish`] is retried.
    Failed,
}

/// Behaviour switches for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Shared/proxied keyspace: skip the key-count refresh.
    pub proxy_compat: bool,
    /// Pause between readiness probes while disconnected.
    pub reconnect_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            proxy_compat: false,
            reconnect_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    connection: Option<Conn>,
    failure: Option<AppError>,
    queue: DeferredQueue<Conn>,
    /// A drain loop owns the queue; new operations must park behind it.
    draining: bool,
    probing: bool,
    /// A connection attempt is in flight.
    attempting: bool,
}

impl Inner {
    /// Outcome to hand an operation right now, or `None` if it has to wait.
    fn gate(&self) -> Option<AppResult<Conn>> {
        if self.draining {
            return None;
        }
        match self.state {
            ConnectionState::Connected => self.connection.clone().map(Ok),
            ConnectionState::Failed => Some(Err(self.failure())),
            ConnectionState::Connecting | ConnectionState::Disconnected => None,
        }
    }

    fn failure(&self) -> AppError {
        self.failure
            .clone()
            .unwrap_or_else(|| AppError::connection("remote store unavailable"))
    }

    /// Claim the drain loop. Returns `false` if one is already running; it
    /// re-reads the state on every batch and will pick up the transition.
    fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }
}

/// Owns one logical connection to a remote store.
///
/// Every operation passes through [`when_ready`](Self::when_ready). While
/// the connection is not usable, operations park in a [`DeferredQueue`] and
/// are released in submission order, exactly once, when it settles.
#[derive(Debug)]
pub struct ConnectionManager {
    connector: Arc<dyn RemoteConnector>,
    options: ConnectionOptions,
    inner: Mutex<Inner>,
    keycount: AtomicI64,
}

impl ConnectionManager {
    /// Create a manager in the `Connecting` state. Nothing is dialled until
    /// [`start`](Self::start) or [`establish`](Self::establish) runs.
    pub fn new(connector: Arc<dyn RemoteConnector>, options: ConnectionOptions) -> Arc<Self> {
        if options.proxy_compat {
            debug!(
                store = %connector.describe(),
                "Proxy compatibility mode: key statistics will not be available"
            );
        }

        Arc::new(Self {
            connector,
            options,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                connection: None,
                failure: None,
                queue: DeferredQueue::new(),
                draining: false,
                probing: false,
                attempting: false,
            }),
            keycount: AtomicI64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the connection attempt on the current runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are delivered to queued operations and logged.
            let _ = this.establish().await;
        })
    }

    /// Run one connection attempt.
    ///
    /// On success the queue drains with the live connection; on failure it
    /// drains with the error and the manager stays `Failed`. Calling this
    /// while `Connected` or `Disconnected`, or while another attempt is in
    /// flight, is a no-op.
    pub async fn establish(&self) -> AppResult<()> {
        {
            let mut inner = self.lock();
            if inner.attempting {
                return Ok(());
            }
            match inner.state {
                ConnectionState::Connected | ConnectionState::Disconnected => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Failed => {
                    inner.state = ConnectionState::Connecting;
                    inner.failure = None;
                    inner.attempting = true;
                }
            }
        }

        let store = self.connector.describe();

        match self.connector.connect().await {
            Ok(conn) => {
                info!(store = %store, "Remote store connected");
                let drain = {
                    let mut inner = self.lock();
                    inner.attempting = false;
                    inner.state = ConnectionState::Connected;
                    inner.connection = Some(Arc::clone(&conn));
                    inner.begin_drain()
                };
                if drain {
                    self.drain();
                }

                if !self.options.proxy_compat {
                    self.refresh_keycount(conn.as_ref()).await;
                }
                Ok(())
            }
            Err(err) => {
                warn!(store = %store, error = %err, "Remote store connect failed");
                let drain = {
                    let mut inner = self.lock();
                    inner.attempting = false;
                    inner.state = ConnectionState::Failed;
                    inner.failure = Some(err.clone());
                    inner.begin_drain()
                };
                if drain {
                    self.drain();
                }
                Err(err)
            }
        }
    }

    /// Run `op` now if the connection has settled, otherwise park it.
    ///
    /// `op` receives the live connection when `Connected`, or the connect
    /// error when `Failed`. It is invoked exactly once.
    pub fn when_ready(&self, op: Continuation<Conn>) {
        let outcome = {
            let mut inner = self.lock();
            match inner.gate() {
                Some(outcome) => outcome,
                None => {
                    inner.queue.push(op);
                    return;
                }
            }
        };
        op(outcome);
    }

    /// Release parked operations batch by batch until the queue is empty or
    /// the state no longer settles them. Continuations run without the lock
    /// held; anything they (or other tasks) submit meanwhile lands in the
    /// next batch.
    fn drain(&self) {
        loop {
            let (batch, outcome) = {
                let mut inner = self.lock();
                let outcome = match inner.state {
                    ConnectionState::Connected => inner.connection.clone().map(Ok),
                    ConnectionState::Failed => Some(Err(inner.failure())),
                    ConnectionState::Connecting | ConnectionState::Disconnected => None,
                };
                match outcome {
                    Some(outcome) if !inner.queue.is_empty() => (inner.queue.take(), outcome),
                    _ => {
                        inner.draining = false;
                        return;
                    }
                }
            };

            debug!(count = batch.len(), ok = outcome.is_ok(), "Releasing deferred operations");
            batch.release(&outcome);
        }
    }

    /// Note an error seen by an in-flight operation.
    ///
    /// Connection-level errors while `Connected` flip the state to
    /// `Disconnected` and start a readiness probe. The queue is left alone.
    pub fn report_error(self: &Arc<Self>, err: &AppError) {
        if !err.is_connection() {
            return;
        }

        let probe = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connected {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            warn!(store = %self.connector.describe(), error = %err, "Remote store connection lost");
            if inner.probing {
                false
            } else {
                inner.probing = true;
                true
            }
        };

        if probe {
            tokio::spawn(Arc::clone(self).recover());
        }
    }

    /// Ping the store until it answers, then mark the connection usable
    /// again and drain what queued up meanwhile.
    async fn recover(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.options.reconnect_interval).await;

            let conn = {
                let mut inner = self.lock();
                if inner.state != ConnectionState::Disconnected {
                    inner.probing = false;
                    return;
                }
                match inner.connection.clone() {
                    Some(conn) => conn,
                    None => {
                        inner.probing = false;
                        return;
                    }
                }
            };

            match conn.ping().await {
                Ok(()) => {
                    let drain = {
                        let mut inner = self.lock();
                        inner.probing = false;
                        if inner.state != ConnectionState::Disconnected {
                            return;
                        }
                        inner.state = ConnectionState::Connected;
                        inner.begin_drain()
                    };
                    info!(store = %self.connector.describe(), "Remote store reachable again");
                    if drain {
                        self.drain();
                    }
                    return;
                }
                Err(err) => {
                    debug!(error = %err, "Remote store still unreachable");
                }
            }
        }
    }

    async fn refresh_keycount(&self, conn: &dyn RemoteConnection) {
        match conn.size().await {
            Ok(size) => {
                let size = i64::try_from(size).unwrap_or(i64::MAX);
                self.keycount.store(size, Ordering::Relaxed);
                debug!(keycount = size, "Refreshed remote key count");
            }
            Err(err) => {
                warn!(error = %err, "Remote key count refresh failed");
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Whether operations currently run without waiting.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of operations parked in the queue.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Last refreshed key count, or `-1` in proxy compatibility mode.
    pub fn keycount(&self) -> i64 {
        if self.options.proxy_compat {
            return -1;
        }
        self.keycount.load(Ordering::Relaxed)
    }

    /// Whether the manager runs in proxy compatibility mode.
    pub fn proxy_compat(&self) -> bool {
        self.options.proxy_compat
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use obcache_core::error::ErrorKind;

    use super::*;
    use crate::remote::mock::{MockConnector, MockStore};

    type Log = Arc<StdMutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> Continuation<Conn> {
        let log = Arc::clone(log);
        Box::new(move |outcome| {
            let entry = match outcome {
                Ok(_) => format!("{label}:ok"),
                Err(e) => format!("{label}:err:{}", e.kind),
            };
            log.lock().unwrap().push(entry);
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_queued_operations_released_in_order_after_connect() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(Arc::clone(&store));
        let manager = ConnectionManager::new(Arc::new(connector), ConnectionOptions::default());
        let log: Log = Arc::default();

        manager.when_ready(recorder(&log, "a"));
        manager.when_ready(recorder(&log, "b"));
        manager.when_ready(recorder(&log, "c"));
        assert_eq!(manager.pending(), 3);
        assert!(entries(&log).is_empty());
        assert!(!manager.is_ready());

        let handle = manager.start();
        gate.open();
        handle.await.unwrap();

        assert_eq!(entries(&log), vec!["a:ok", "b:ok", "c:ok"]);
        assert_eq!(manager.pending(), 0);
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.when_ready(recorder(&log, "d"));
        assert_eq!(entries(&log).last().map(String::as_str), Some("d:ok"));
    }

    #[tokio::test]
    async fn test_failed_connect_fails_queue_in_order_then_fails_fast() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(store);
        let manager = ConnectionManager::new(Arc::new(connector), ConnectionOptions::default());
        let log: Log = Arc::default();

        manager.when_ready(recorder(&log, "a"));
        manager.when_ready(recorder(&log, "b"));

        let handle = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.establish().await }
        });
        gate.fail("connection refused");
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Connection);

        assert_eq!(entries(&log), vec!["a:err:CONNECTION", "b:err:CONNECTION"]);
        assert_eq!(manager.pending(), 0);
        assert_eq!(manager.state(), ConnectionState::Failed);

        manager.when_ready(recorder(&log, "late"));
        assert_eq!(manager.pending(), 0);
        assert_eq!(
            entries(&log).last().map(String::as_str),
            Some("late:err:CONNECTION")
        );
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(store);
        let connector = Arc::new(connector);
        let manager = ConnectionManager::new(connector.clone(), ConnectionOptions::default());

        gate.fail("no route to host");
        assert!(manager.establish().await.is_err());
        assert_eq!(manager.state(), ConnectionState::Failed);

        manager.establish().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_operations_submitted_during_drain_run_after_the_batch() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(store);
        let manager = ConnectionManager::new(Arc::new(connector), ConnectionOptions::default());
        let log: Log = Arc::default();

        let nested = {
            let manager = Arc::clone(&manager);
            let log = Arc::clone(&log);
            Box::new(move |_outcome: AppResult<Conn>| {
                log.lock().unwrap().push("outer".to_string());
                manager.when_ready(recorder(&log, "nested"));
            })
        };
        manager.when_ready(nested);
        manager.when_ready(recorder(&log, "second"));

        let handle = manager.start();
        gate.open();
        handle.await.unwrap();

        assert_eq!(entries(&log), vec!["outer", "second:ok", "nested:ok"]);
        assert_eq!(manager.pending(), 0);
    }

    #[tokio::test]
    async fn test_establish_while_attempt_in_flight_does_not_dial_again() {
        let store = MockStore::new();
        let (connector, gate) = MockConnector::gated(Arc::clone(&store));
        let connector = Arc::new(connector);
        let manager = ConnectionManager::new(connector.clone(), ConnectionOptions::default());

        let handle = manager.start();
        while connector.attempts() < 1 {
            tokio::task::yield_now().await;
        }

        manager.establish().await.unwrap();
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        gate.open();
        handle.await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 1);
        let refreshes = store.commands().iter().filter(|c| *c == "DBSIZE").count();
        assert_eq!(refreshes, 1);
    }

    #[tokio::test]
    async fn test_keycount_refreshed_after_connect() {
        let store = MockStore::new();
        store.insert_raw("obc:1:a", "1");
        store.insert_raw("obc:1:b", "2");
        let manager = ConnectionManager::new(
            Arc::new(MockConnector::new(Arc::clone(&store))),
            ConnectionOptions::default(),
        );

        assert_eq!(manager.keycount(), 0);
        manager.establish().await.unwrap();
        assert_eq!(manager.keycount(), 2);
        assert!(store.commands().contains(&"DBSIZE".to_string()));
    }

    #[tokio::test]
    async fn test_keycount_refresh_failure_is_ignored() {
        let store = MockStore::new();
        store.fail_size(true);
        let manager = ConnectionManager::new(
            Arc::new(MockConnector::new(Arc::clone(&store))),
            ConnectionOptions::default(),
        );

        manager.establish().await.unwrap();
        assert!(manager.is_ready());
        assert_eq!(manager.keycount(), 0);
    }

    #[tokio::test]
    async fn test_proxy_compat_skips_keycount() {
        let store = MockStore::new();
        let manager = ConnectionManager::new(
            Arc::new(MockConnector::new(Arc::clone(&store))),
            ConnectionOptions {
                proxy_compat: true,
                ..ConnectionOptions::default()
            },
        );

        assert_eq!(manager.keycount(), -1);
        manager.establish().await.unwrap();
        assert_eq!(manager.keycount(), -1);
        assert!(!store.commands().contains(&"DBSIZE".to_string()));
    }

    #[tokio::test]
    async fn test_connection_loss_queues_until_probe_succeeds() {
        let store = MockStore::new();
        let manager = ConnectionManager::new(
            Arc::new(MockConnector::new(Arc::clone(&store))),
            ConnectionOptions {
                proxy_compat: false,
                reconnect_interval: Duration::from_millis(10),
            },
        );
        manager.establish().await.unwrap();
        let log: Log = Arc::default();

        store.set_offline(true);
        manager.report_error(&AppError::connection("broken pipe"));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_ready());

        manager.when_ready(recorder(&log, "parked"));
        assert_eq!(manager.pending(), 1);

        store.set_offline(false);
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(entries(&log), vec!["parked:ok"]);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_command_errors_do_not_disconnect() {
        let store = MockStore::new();
        let manager = ConnectionManager::new(
            Arc::new(MockConnector::new(store)),
            ConnectionOptions::default(),
        );
        manager.establish().await.unwrap();

        manager.report_error(&AppError::cache("WRONGTYPE"));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }
}
