use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
pub struct ApplyQueryParams {
    dry_run: Option<bool>,
}

pub async fn handle(
    State(state): State<AppState>,
    Query(params): Query<ApplyQueryParams>,
) -> impl IntoResponse {
    let dry_run = params.dry_run.unwrap_or(false);
    info!(dry_run, "Received apply request");

    match state.updater.apply_pending(dry_run).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => super::error_response(&e).into_response(),
    }
}
