//! Route modules for the PDF organizer server

pub mod files;
pub mod health;
pub mod settings;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let max_file_size = state.config().intake.max_file_size();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/files", files::router(max_file_size))
        .nest("/api/v1/settings", settings::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
