//! Health check handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::response::{CacheHealth, HealthResponse};
use crate::state::AppState;

/// GET /health
///
/// Answers 503 while any cache is not ready to serve without waiting.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let caches: Vec<CacheHealth> = state
        .registry
        .entries()
        .into_iter()
        .map(|(name, backend)| CacheHealth {
            name,
            ready: backend.is_ready(),
            pending: backend.pending(),
        })
        .collect();

    let all_ready = caches.iter().all(|c| c.ready);
    let (code, status) = if all_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            caches,
        }),
    )
}
