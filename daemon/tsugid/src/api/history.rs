use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct HistoryQueryParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn handle(
    State(state): State<AppState>,
    Query(params): Query<HistoryQueryParams>,
) -> impl IntoResponse {
    // Newest first; the limit is clamped so one request cannot drag the
    // whole table over the wire.
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    match state.audit.history(limit, offset).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => super::error_response(&e).into_response(),
    }
}
