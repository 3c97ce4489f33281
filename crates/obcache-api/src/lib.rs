//! # obcache-api
//!
//! HTTP API layer for obcache built on Axum.
//!
//! Serves the cache introspection view (`/debug/caches`) and a readiness
//! check (`/health`), maps [`AppError`](obcache_core::AppError) kinds to
//! status codes, and runs the server with graceful shutdown.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
