//! Named registry of live cache instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::debug;

use obcache_core::traits::cache::CacheBackend;

/// Prefix for names handed out to anonymous registrations.
pub const ANON_PREFIX: &str = "anon_";

/// Maps cache names to backends.
///
/// Entries are only ever added. Registering under a name that is already
/// taken replaces the previous entry.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: DashMap<String, Arc<dyn CacheBackend>>,
    /// Next index for `anon_<n>` names
    next_anon: AtomicUsize,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, returning it unchanged.
    pub fn register<B: CacheBackend>(&self, backend: Arc<B>, name: Option<&str>) -> Arc<B> {
        let erased: Arc<dyn CacheBackend> = backend.clone();
        self.register_dyn(erased, name);
        backend
    }

    /// Register a type-erased backend. Returns the name it was stored under.
    pub fn register_dyn(&self, backend: Arc<dyn CacheBackend>, name: Option<&str>) -> String {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let index = self.next_anon.fetch_add(1, Ordering::Relaxed);
                format!("{ANON_PREFIX}{index}")
            }
        };

        if self.caches.insert(name.clone(), backend).is_some() {
            debug!(cache = %name, "Replaced existing cache registration");
        } else {
            debug!(cache = %name, "Registered cache");
        }
        name
    }

    /// Look up a cache by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CacheBackend>> {
        self.caches.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Every registration, sorted by name.
    pub fn entries(&self) -> Vec<(String, Arc<dyn CacheBackend>)> {
        let mut entries: Vec<_> = self
            .caches
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
