//! Session listing and remote logout.

use axum::Json;
use axum::extract::{Path, State};
use runa_core::models::RefreshToken;
use tracing::info;

use super::parse_id;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;

/// `GET /api/sessions` — the caller's refresh tokens without their values.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<RefreshToken>>> {
    let sessions = state.store.list_refresh_tokens(user.user.uid).await?;
    Ok(Json(sessions))
}

/// `DELETE /api/sessions/{id}`
pub async fn delete_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    if !state
        .store
        .remove_refresh_token_by_id(user.user.uid, id)
        .await?
    {
        return Err(AppError::NotFound);
    }
    info!(uid = %user.user.uid, session = %id, "session revoked");
    Ok(Json(serde_json::json!({"success": true})))
}
