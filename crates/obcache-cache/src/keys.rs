//! Key namespacing for remote caches.
//!
//! Every key a remote cache writes is physically `obc:<id>:<key>`, so
//! several caches can share one store without colliding.

/// Scheme segment of every namespaced key.
pub const SCHEME: &str = "obc";

/// Key prefix for one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Namespace for the cache with the given numeric id.
    pub fn for_id(id: u32) -> Self {
        Self {
            prefix: format!("{SCHEME}:{id}:"),
        }
    }

    /// Build the physical key for a logical key.
    pub fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Return the prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
