//! Core traits defined in `obcache-core` and implemented by other crates.

pub mod cache;

pub use cache::{CacheBackend, PendingReset};
