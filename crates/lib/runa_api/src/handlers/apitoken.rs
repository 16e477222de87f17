//! API token handlers. One token per user; issuing replaces the previous one.

use axum::Json;
use axum::extract::State;
use runa_core::models::ApiToken;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;

/// `GET /api/apitoken`
pub async fn get_api_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiToken>> {
    let token = state
        .store
        .get_api_token(user.user.uid)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(token))
}

/// `POST /api/apitoken`
pub async fn post_api_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiToken>> {
    let token = state.tokens.issue_api_token(user.user.uid).await?;
    Ok(Json(token))
}

/// `DELETE /api/apitoken`
pub async fn delete_api_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<serde_json::Value>> {
    state.tokens.reset_api_token(user.user.uid).await?;
    Ok(Json(serde_json::json!({"success": true})))
}
