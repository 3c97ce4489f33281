//! Introspection view over the cache registry.
//!
//! Produces a point-in-time snapshot of every registered cache (hit rate,
//! resets, pending operations, key counts) and can flush one cache by name.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use obcache_core::result::AppResult;
use obcache_core::traits::cache::CacheBackend;

use crate::registry::CacheRegistry;

/// Optional actions for a view request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectQuery {
    /// Include the values dump of this cache.
    #[serde(default)]
    pub detail: Option<String>,
    /// Flush this cache (mutating requests only).
    #[serde(default)]
    pub flush: Option<String>,
}

/// Report for one registered cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheReport {
    pub name: String,
    pub size: u64,
    pub keycount: i64,
    /// Integer percentage of lookups that hit.
    pub hitrate: u64,
    pub resets: u64,
    /// Operations waiting for the backend to become ready.
    pub pending: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Map<String, Value>>,
}

/// How a requested flush ended by the time the view answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStatus {
    /// The backend confirmed the flush.
    Completed,
    /// The flush was issued but the backend reported an error.
    Failed,
    /// The flush did not finish within the flush timeout and keeps running.
    Running,
}

/// Full view response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectSnapshot {
    pub pid: u32,
    /// Process uptime in seconds.
    pub uptime: f64,
    pub host: String,
    pub data: Vec<CacheReport>,
    /// Outcome of the flush this view performed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_status: Option<FlushStatus>,
}

/// Identity of the running process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub host: String,
    started: Instant,
}

impl ProcessInfo {
    /// Capture the current process. Uptime counts from this call.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: hostname(),
            started: Instant::now(),
        }
    }

    /// Seconds since [`current`](Self::current) was called.
    pub fn uptime(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

fn hostname() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return host.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Evaluates the registry into [`InspectSnapshot`]s.
#[derive(Debug, Clone)]
pub struct Inspector {
    registry: Arc<CacheRegistry>,
    /// How long a flush is awaited before the view answers anyway.
    flush_timeout: Duration,
    process: ProcessInfo,
}

impl Inspector {
    /// Create an inspector over `registry`.
    pub fn new(registry: Arc<CacheRegistry>, flush_timeout: Duration) -> Self {
        Self {
            registry,
            flush_timeout,
            process: ProcessInfo::current(),
        }
    }

    /// Replace the captured process identity.
    pub fn with_process(mut self, process: ProcessInfo) -> Self {
        self.process = process;
        self
    }

    /// The registry being inspected.
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Read-only snapshot, optionally with one cache's values.
    pub fn snapshot(&self, detail: Option<&str>) -> InspectSnapshot {
        let data = self
            .registry
            .entries()
            .into_iter()
            .map(|(name, backend)| {
                let with_values = detail == Some(name.as_str());
                report(name, backend.as_ref(), with_values)
            })
            .collect();
        self.wrap(data)
    }

    /// Evaluate a view request.
    ///
    /// For each cache, `detail` naming it attaches its values if it has
    /// any. Otherwise, on a `mutating` request, `flush` naming it resets the
    /// cache and bumps its reset counter, and the snapshot carries the
    /// flush outcome. Unknown names are ignored. A refused reset is
    /// returned as an error.
    pub async fn view(&self, query: &InspectQuery, mutating: bool) -> AppResult<InspectSnapshot> {
        let mut data = Vec::new();
        let mut flush_status = None;

        for (name, backend) in self.registry.entries() {
            let detail = query.detail.as_deref() == Some(name.as_str());
            if detail && backend.values().is_some() {
                data.push(report(name, backend.as_ref(), true));
                continue;
            }

            if mutating && query.flush.as_deref() == Some(name.as_str()) {
                flush_status = Some(self.flush(&name, backend.as_ref()).await?);
            }
            data.push(report(name, backend.as_ref(), false));
        }

        let mut snapshot = self.wrap(data);
        snapshot.flush_status = flush_status;
        Ok(snapshot)
    }

    /// Write a plain snapshot to `sink` as one line of JSON.
    pub fn log<W: Write>(&self, mut sink: W) -> AppResult<()> {
        let snapshot = self.snapshot(None);
        serde_json::to_writer(&mut sink, &snapshot)?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }

    async fn flush(&self, name: &str, backend: &dyn CacheBackend) -> AppResult<FlushStatus> {
        let pending = backend.reset()?;
        let resets = backend.stats().record_reset();
        info!(cache = %name, resets, "Cache flush requested");

        let task = tokio::spawn(pending);
        let status = match tokio::time::timeout(self.flush_timeout, task).await {
            Ok(Ok(Ok(()))) => FlushStatus::Completed,
            Ok(Ok(Err(err))) => {
                warn!(cache = %name, error = %err, "Cache flush failed");
                FlushStatus::Failed
            }
            Ok(Err(err)) => {
                warn!(cache = %name, error = %err, "Cache flush task aborted");
                FlushStatus::Failed
            }
            Err(_) => {
                warn!(
                    cache = %name,
                    timeout_ms = self.flush_timeout.as_millis() as u64,
                    "Cache flush still running in background"
                );
                FlushStatus::Running
            }
        };
        Ok(status)
    }

    fn wrap(&self, data: Vec<CacheReport>) -> InspectSnapshot {
        InspectSnapshot {
            pid: self.process.pid,
            uptime: self.process.uptime(),
            host: self.process.host.clone(),
            data,
            flush_status: None,
        }
    }
}

fn report(name: String, backend: &dyn CacheBackend, with_values: bool) -> CacheReport {
    let stats = backend.stats().snapshot();
    CacheReport {
        name,
        size: backend.size(),
        keycount: backend.keycount(),
        hitrate: stats.hitrate(),
        resets: stats.reset,
        pending: backend.pending(),
        values: if with_values { backend.values() } else { None },
    }
}
