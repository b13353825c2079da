use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tsugi_domain::update::ImageUpdateRecord;

#[derive(Serialize)]
pub struct StatusResponse {
    pub records: Vec<ImageUpdateRecord>,
    pub pending: usize,
    pub in_flight: Vec<String>,
}

pub async fn handle(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.list().await {
        Ok(records) => {
            let pending = records.iter().filter(|r| r.has_update).count();
            Json(StatusResponse {
                records,
                pending,
                in_flight: state.updater.in_flight(),
            })
            .into_response()
        }
        Err(e) => super::error_response(&e).into_response(),
    }
}
