//! In-memory stand-in for a remote store, for development and testing.
//!
//! Simulates a key-value server without a network: connection attempts can
//! be held open or failed on demand, the store can be taken offline, and
//! every command is recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use obcache_core::error::AppError;
use obcache_core::result::AppResult;

use super::connection::{RemoteConnection, RemoteConnector};

/// Mock key-value store shared between a connector and the test.
#[derive(Debug, Default)]
pub struct MockStore {
    /// Stored values by physical key
    entries: Mutex<HashMap<String, String>>,
    /// TTL of each stored key, in seconds
    ttls: Mutex<HashMap<String, u64>>,
    /// Every command received, in arrival order
    commands: Mutex<Vec<String>>,
    /// Whether commands fail with connection errors
    offline: AtomicBool,
    /// Whether `size` fails with a command error
    size_fails: AtomicBool,
}

impl MockStore {
    /// Create an empty, online store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a raw payload, bypassing any cache
    pub fn insert_raw(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
    }

    /// Raw payload stored under a physical key
    pub fn entry(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// TTL recorded for a physical key
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let ttls = self.ttls.lock().unwrap_or_else(|e| e.into_inner());
        ttls.get(key).copied()
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make every command (and ping) fail with a connection error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make `size` fail
    pub fn fail_size(&self, fail: bool) {
        self.size_fails.store(fail, Ordering::SeqCst);
    }

    fn record(&self, command: String) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::connection("mock store offline"));
        }
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        commands.push(command);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        self.ttls.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }
}

#[async_trait]
impl RemoteConnection for MockStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.record(format!("GET {key}"))?;
        Ok(self.entry(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        self.record(format!("SETEX {key} {ttl_secs} {value}"))?;
        self.insert_raw(key, value);
        self.ttls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> AppResult<()> {
        self.record(format!("EXPIRE {key} {ttl_secs}"))?;
        if ttl_secs == 0 {
            self.remove(key);
        } else if self.entry(key).is_some() {
            self.ttls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), ttl_secs);
        }
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        self.record("FLUSHDB".to_string())?;
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.ttls.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    async fn size(&self) -> AppResult<u64> {
        self.record("DBSIZE".to_string())?;
        if self.size_fails.load(Ordering::SeqCst) {
            return Err(AppError::cache("ERR DBSIZE disabled"));
        }
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.len() as u64)
    }

    async fn ping(&self) -> AppResult<()> {
        self.record("PING".to_string())
    }
}

/// Connector handing out a shared [`MockStore`].
#[derive(Debug)]
pub struct MockConnector {
    store: Arc<MockStore>,
    /// Pending decision for the next connection attempt
    gate: Mutex<Option<oneshot::Receiver<Result<(), String>>>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    /// Connector whose attempts succeed immediately
    pub fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(None),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Connector whose first attempt waits for the returned gate
    pub fn gated(store: Arc<MockStore>) -> (Self, MockGate) {
        let (tx, rx) = oneshot::channel();
        let connector = Self {
            store,
            gate: Mutex::new(Some(rx)),
            attempts: AtomicUsize::new(0),
        };
        (connector, MockGate { tx })
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for MockConnector {
    async fn connect(&self) -> AppResult<Arc<dyn RemoteConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let pending = self.gate.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(decision) = pending {
            match decision.await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => return Err(AppError::connection(reason)),
                Err(_) => return Err(AppError::connection("mock gate dropped")),
            }
        }

        let conn: Arc<dyn RemoteConnection> = self.store.clone();
        Ok(conn)
    }

    fn describe(&self) -> String {
        "mock://store".to_string()
    }
}

/// Decides the outcome of a gated connection attempt.
#[derive(Debug)]
pub struct MockGate {
    tx: oneshot::Sender<Result<(), String>>,
}

impl MockGate {
    /// Let the attempt succeed
    pub fn open(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Make the attempt fail with a connection error
    pub fn fail(self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_string()));
    }
}
