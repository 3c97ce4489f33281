//! # obcache-cache
//!
//! Cache backend implementations for obcache, plus the registry and
//! introspection view that sit on top of them:
//!
//! - **remote**: backend for a remote key-value store that keeps accepting
//!   operations while its connection is down and releases them in order
//!   once it is up
//! - **redis**: the Redis transport behind the remote backend, using the
//!   [redis](https://crates.io/crates/redis) crate
//! - **memory**: in-process backend using [moka](https://crates.io/crates/moka)
//! - **registry** / **inspect**: named cache registry and stats snapshots
//!
//! Backends are selected at runtime from configuration via [`provider`].

pub mod inspect;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod registry;
pub mod remote;

pub use inspect::{InspectQuery, InspectSnapshot, Inspector};
pub use provider::{build_cache, build_registry};
pub use registry::CacheRegistry;
pub use remote::RemoteCache;
