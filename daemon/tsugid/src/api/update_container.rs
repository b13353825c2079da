use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

/// Targeted check-and-apply for one container, by id or name.
pub async fn handle(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!(container = %id, "Received targeted update request");

    match state.updater.auto_update_container(&id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => super::error_response(&e).into_response(),
    }
}
