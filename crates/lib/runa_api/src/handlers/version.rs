//! Version endpoint.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::VersionResponse;

/// `GET /api/version`
pub async fn version_handler(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: runa_core::version().to_string(),
        release: state.config.release,
    })
}
