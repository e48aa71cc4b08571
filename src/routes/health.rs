//! Health check

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    files: usize,
    live_previews: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let organizer = state.organizer();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        files: organizer.len().await,
        live_previews: organizer.previews().live_handles(),
    })
}
