//! Account handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::CookieJar;
use runa_core::models::PublicUser;
use runa_core::store::UserLookup;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{DEFAULT_PAGE_ORDER_SCOPE, PageOrderQuery, PageOrderRequest, UserUpdateRequest};
use crate::services::cookies::clear_refresh_cookie;
use crate::services::users;

/// `GET /api/users/{username}` — 200 if the name is taken, 404 otherwise.
pub async fn check_username_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .store
        .get_user(UserLookup::Name(&username))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(serde_json::json!({"success": true})))
}

/// `GET /api/users/me`
pub async fn get_me_handler(
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> Json<PublicUser> {
    Json(user.user)
}

/// `POST /api/users/me`
pub async fn update_me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<UserUpdateRequest>,
) -> AppResult<Json<PublicUser>> {
    let updated = users::update_me(&state, user.user.uid, body).await?;
    Ok(Json(updated))
}

/// `POST /api/users/me/pageorder?scope=...`
pub async fn page_order_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<PageOrderQuery>,
    ApiJson(body): ApiJson<PageOrderRequest>,
) -> AppResult<Json<PublicUser>> {
    let scope = query.scope.as_deref().unwrap_or(DEFAULT_PAGE_ORDER_SCOPE);
    let updated = users::set_page_order(&state, user.user.uid, scope, &body.page_order).await?;
    Ok(Json(updated))
}

/// `DELETE /api/users/me`
pub async fn delete_me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    jar: CookieJar,
    ApiJson(body): ApiJson<UserUpdateRequest>,
) -> AppResult<(CookieJar, Json<serde_json::Value>)> {
    users::delete_me(&state, user.user.uid, &body.current_password).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.release));
    Ok((jar, Json(serde_json::json!({"success": true}))))
}
