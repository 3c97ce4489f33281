//! Redis transport for the remote cache backend.

pub mod client;
pub mod operations;

pub use client::RedisConnector;
pub use operations::RedisConnection;
