//! Per-cache statistics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hit/miss/reset counters owned by a cache backend.
///
/// Counters only ever grow. The pending-operation depth is not stored here;
/// it is read from the backend at observation time.
#[derive(Debug)]
pub struct CacheStats {
    /// Lookups that found a value
    pub hit: AtomicU64,
    /// Lookups that found nothing
    pub miss: AtomicU64,
    /// Explicit flushes
    pub reset: AtomicU64,
}

impl CacheStats {
    /// Create new zeroed counters
    pub fn new() -> Self {
        Self {
            hit: AtomicU64::new(0),
            miss: AtomicU64::new(0),
            reset: AtomicU64::new(0),
        }
    }

    /// Record a lookup that found a value
    pub fn record_hit(&self) {
        self.hit.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that found nothing
    pub fn record_miss(&self) {
        self.miss.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an explicit flush, returning the new total
    pub fn record_reset(&self) -> u64 {
        self.reset.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hit: self.hit.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            reset: self.reset.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Lookups that found a value
    pub hit: u64,
    /// Lookups that found nothing
    pub miss: u64,
    /// Explicit flushes
    pub reset: u64,
}

impl StatsSnapshot {
    /// Integer hit rate in percent; zero when nothing has been looked up.
    pub fn hitrate(&self) -> u64 {
        let total = self.hit + self.miss;
        if total == 0 {
            return 0;
        }
        self.hit * 100 / total
    }
}
