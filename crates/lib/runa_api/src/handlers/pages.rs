//! Page handlers.
//!
//! Reads go through the cache. Writes hit the store first and refresh the
//! cache entry afterwards. Pages owned by someone else look like missing
//! pages.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use runa_core::id::Snowflake;
use runa_core::models::Page;

use super::parse_id;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::PageRequest;

async fn load_owned(state: &AppState, owner: Snowflake, raw_id: &str) -> AppResult<Page> {
    let id = parse_id(raw_id)?;
    state
        .cache
        .get_page_by_id(id)
        .await?
        .filter(|p| p.owner == owner)
        .ok_or(AppError::NotFound)
}

fn check_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    Ok(())
}

/// `POST /api/pages`
pub async fn create_page_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<PageRequest>,
) -> AppResult<(StatusCode, Json<Page>)> {
    check_title(&body.title)?;
    let page = Page::new(user.user.uid, body.title, body.data);
    state.store.create_page(&page).await?;
    state.cache.set_page_by_id(page.uid, Some(page.clone()));
    Ok((StatusCode::CREATED, Json(page)))
}

/// `GET /api/pages/{id}`
pub async fn get_page_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Page>> {
    let page = load_owned(&state, user.user.uid, &id).await?;
    Ok(Json(page))
}

/// `POST /api/pages/{id}`
pub async fn edit_page_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PageRequest>,
) -> AppResult<Json<Page>> {
    check_title(&body.title)?;
    let mut page = load_owned(&state, user.user.uid, &id).await?;
    page.title = body.title;
    page.data = body.data;
    page.edited = Utc::now();
    state.store.edit_page(&page).await?;
    state.cache.set_page_by_id(page.uid, Some(page.clone()));
    Ok(Json(page))
}

/// `DELETE /api/pages/{id}`
pub async fn delete_page_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let page = load_owned(&state, user.user.uid, &id).await?;
    state.store.delete_page(page.uid).await?;
    state.cache.set_page_by_id(page.uid, None);
    Ok(Json(serde_json::json!({"success": true})))
}
