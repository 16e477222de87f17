//! Session request handlers: login, registration, access tokens, logout.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use runa_core::models::PublicUser;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, Client};
use crate::models::{AccessTokenResponse, LoginRequest};
use crate::services::auth;
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

/// `POST /api/login` — verify credentials and set the refresh cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<PublicUser>)> {
    let (user, token) = auth::login(&state, &body, &client).await?;
    let jar = jar.add(refresh_cookie(
        &token.token,
        token.deadline,
        state.config.release,
    ));
    Ok((jar, Json(user)))
}

/// `POST /api/users` — create an account and log it in.
pub async fn register_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<PublicUser>)> {
    let (user, token) = auth::register(&state, &body, &client).await?;
    let jar = jar.add(refresh_cookie(
        &token.token,
        token.deadline,
        state.config.release,
    ));
    Ok((StatusCode::CREATED, jar, Json(user)))
}

/// `POST /api/accesstoken` — exchange the refresh cookie for an access token.
pub async fn access_token_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
) -> AppResult<Json<AccessTokenResponse>> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;
    let signed = state
        .tokens
        .obtain_access_token(&presented, &client)
        .await?;
    Ok(Json(AccessTokenResponse {
        access_token: signed.token,
        deadline: signed.expires_at,
    }))
}

/// `POST /api/logout` — delete the refresh token and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<serde_json::Value>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::Unauthorized)?;
    state.tokens.logout(&presented).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.release));
    Ok((jar, Json(serde_json::json!({"success": true}))))
}
