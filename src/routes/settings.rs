//! Settings Routes
//!
//! Endpoints:
//! - GET /api/v1/settings - Upload limits and preview size bounds
//! - GET /api/v1/settings/preview-size - Current thumbnail size
//! - PUT /api/v1/settings/preview-size - Change the thumbnail size

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::intake::ADVERTISED_EXTENSIONS;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    /// Extensions offered by the file picker. Only PDFs pass validation.
    pub accepted_extensions: &'static [&'static str],
    pub max_file_size: u64,
    pub preview: PreviewSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSettings {
    pub size: u32,
    pub default_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub step: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewSize {
    pub size: u32,
}

/// Create the settings router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_settings))
        .route("/preview-size", get(get_preview_size).put(set_preview_size))
}

/// GET /api/v1/settings
async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let config = state.config();
    let bounds = config.preview;

    Json(SettingsResponse {
        accepted_extensions: ADVERTISED_EXTENSIONS,
        max_file_size: config.intake.max_file_size(),
        preview: PreviewSettings {
            size: state.preview_size().await,
            default_size: bounds.default_size,
            min_size: bounds.min_size,
            max_size: bounds.max_size,
            step: bounds.step,
        },
    })
}

/// GET /api/v1/settings/preview-size
async fn get_preview_size(State(state): State<AppState>) -> Json<PreviewSize> {
    Json(PreviewSize {
        size: state.preview_size().await,
    })
}

/// PUT /api/v1/settings/preview-size
///
/// Out-of-range sizes are clamped, not rejected.
async fn set_preview_size(
    State(state): State<AppState>,
    Json(request): Json<PreviewSize>,
) -> Json<PreviewSize> {
    let size = state.set_preview_size(request.size).await;
    tracing::debug!(requested = request.size, size = size, "Preview size changed");
    Json(PreviewSize { size })
}
