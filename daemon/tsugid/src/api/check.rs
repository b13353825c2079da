use crate::state::AppState;
use axum::extract::{Json, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::info;
use tsugi_domain::credential::RegistryCredential;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CheckRequest {
    /// Refs to check. Omitted means every image a running container uses.
    pub images: Option<Vec<String>>,
    /// Extra credentials for this request, tried before stored ones.
    pub credentials: Option<Vec<RegistryCredential>>,
    /// Report results without persisting records.
    pub dry_run: bool,
}

pub async fn handle(
    State(state): State<AppState>,
    body: Option<Json<CheckRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    info!(
        images = request.images.as_ref().map(|i| i.len()),
        dry_run = request.dry_run,
        "Received update check request"
    );

    match state
        .updater
        .check(request.images, request.credentials, request.dry_run)
        .await
    {
        Ok(results) => Json(results).into_response(),
        Err(e) => super::error_response(&e).into_response(),
    }
}
