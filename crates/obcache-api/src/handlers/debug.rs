//! Cache introspection handlers.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::Method;

use obcache_cache::inspect::{InspectQuery, InspectSnapshot};

use crate::error::ApiError;
use crate::state::AppState;

/// GET/POST /debug/caches?detail=<name>&flush=<name>
///
/// `flush` only acts on POST.
pub async fn caches(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<InspectQuery>,
) -> Result<Json<InspectSnapshot>, ApiError> {
    let mutating = method == Method::POST;
    let snapshot = state.inspector.view(&query, mutating).await?;
    Ok(Json(snapshot))
}
