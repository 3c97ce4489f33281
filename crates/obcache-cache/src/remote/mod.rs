//! Remote-store cache backend.
//!
//! The pieces, leaves first:
//!
//! - [`queue::DeferredQueue`]: operations waiting for the connection
//! - [`manager::ConnectionManager`]: connection lifecycle and the readiness gate
//! - [`adapter::RemoteCache`]: the [`CacheBackend`](obcache_core::CacheBackend)
//!   built on the two above
//!
//! The transport itself sits behind [`connection::RemoteConnector`] and
//! [`connection::RemoteConnection`].

pub mod adapter;
pub mod connection;
pub mod manager;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod queue;

pub use adapter::RemoteCache;
pub use connection::{RemoteConnection, RemoteConnector};
pub use manager::{ConnectionManager, ConnectionOptions, ConnectionState};
pub use queue::DeferredQueue;
