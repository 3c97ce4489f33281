//! # obcache-core
//!
//! Core crate for obcache. Contains the cache backend capability trait,
//! configuration schemas, per-cache statistics counters, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other obcache crates.

pub mod config;
pub mod error;
pub mod result;
pub mod stats;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
pub use stats::{CacheStats, StatsSnapshot};
pub use traits::cache::{CacheBackend, PendingReset};
