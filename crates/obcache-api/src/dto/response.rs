//! Response DTOs.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when every cache is ready, `degraded` otherwise.
    pub status: String,
    /// Version.
    pub version: String,
    /// Per-cache readiness.
    pub caches: Vec<CacheHealth>,
}

/// Readiness of one cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub name: String,
    pub ready: bool,
    /// Operations waiting for the backend.
    pub pending: usize,
}
