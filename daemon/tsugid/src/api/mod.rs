pub mod apply;
pub mod check;
pub mod history;
pub mod middleware;
pub mod status;
pub mod update_container;

use crate::state::AppState;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tsugi_common::diagnostic;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version_handler))
        .route("/updates/check", post(check::handle))
        .route("/updates/apply", post(apply::handle))
        .route("/updates/status", get(status::handle))
        .route("/updates/history", get(history::handle))
        .route("/containers/:id/update", post(update_container::handle))
        .layer(axum::middleware::from_fn(middleware::trace_request))
        .with_state(state)
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({
        "Name": "tsugid",
        "Version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Shared error shape: the diagnostic code drives the status, and the
/// suggestion rides along when one exists.
pub fn error_response(error: &diagnostic::Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match error.code() {
        "UPD_NOT_FOUND" => StatusCode::NOT_FOUND,
        "UPD_PARSE_ERROR" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "message": error.to_string(),
            "code": error.code(),
            "suggestion": error.suggestion(),
        })),
    )
}
