//! Authentication service: login, registration and request identity.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use runa_core::auth::password;
use runa_core::auth::tokens::ClientInfo;
use runa_core::cache::CacheEntry;
use runa_core::models::{PublicUser, RefreshToken, User};
use runa_core::store::UserLookup;
use runa_core::validation::{validate_password, validate_user, validate_username};
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::LoginRequest;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: PublicUser,
    /// Raw API token when the request authenticated with one.
    pub api_token: Option<String>,
}

/// Authorization header schemes.
const SCHEME_API_TOKEN: &str = "basic";
const SCHEME_ACCESS_TOKEN: &str = "accesstoken";

/// Verify credentials and open a session.
///
/// The per-client budget only shrinks on failure and is checked before the
/// store is touched.
pub async fn login(
    state: &AppState,
    req: &LoginRequest,
    client: &ClientInfo,
) -> AppResult<(PublicUser, RefreshToken)> {
    let limiter = state.limiter.get_limiter(
        &format!("login:{}", client.addr),
        state.config.login_interval,
        state.config.login_burst,
    );
    if limiter.tokens() == 0 {
        warn!(client = %client.addr, "login rate limited");
        return Err(AppError::RateLimited {
            retry_after_secs: limiter.retry_after().as_secs(),
        });
    }

    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("username and password required".into()));
    }

    let user = state
        .store
        .get_user(UserLookup::Name(&req.username))
        .await?;
    let verified = match &user {
        Some(u) => password::verify_blocking(&u.password_hash, &req.password).await,
        None => false,
    };
    let Some(user) = user.filter(|_| verified) else {
        limiter.allow();
        debug!(client = %client.addr, "login failed");
        return Err(AppError::Unauthorized);
    };

    if password::needs_rehash(&user.password_hash) {
        upgrade_hash(state, user.clone(), &req.password).await?;
    }

    let token = state
        .tokens
        .create_and_set_refresh_token(user.uid, req.remember, client)
        .await?;
    info!(uid = %user.uid, "user logged in");
    Ok((user.public(), token))
}

/// Re-hash a legacy password with the current scheme.
async fn upgrade_hash(state: &AppState, mut user: User, password: &str) -> AppResult<()> {
    user.password_hash = state.hasher.hash_blocking(password).await?;
    state.store.edit_user(&user).await?;
    state.cache.set_user_by_id(user.uid, Some(user.clone()));
    info!(uid = %user.uid, "password hash upgraded");
    Ok(())
}

/// Create an account and open a session for it.
pub async fn register(
    state: &AppState,
    req: &LoginRequest,
    client: &ClientInfo,
) -> AppResult<(PublicUser, RefreshToken)> {
    validate_username(&req.username, false)?;
    validate_password(&req.password)?;

    if state
        .store
        .get_user(UserLookup::Name(&req.username))
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("username already in use".into()));
    }

    let hash = state.hasher.hash_blocking(&req.password).await?;
    let user = User::new(&req.username, hash);
    validate_user(&user, false)?;

    state.store.create_user(&user).await?;
    state.cache.set_user_by_id(user.uid, Some(user.clone()));

    let token = state
        .tokens
        .create_and_set_refresh_token(user.uid, req.remember, client)
        .await?;
    info!(uid = %user.uid, username = %user.username, "user registered");
    Ok((user.public(), token))
}

/// Resolve the identity behind a request's `Authorization` header.
///
/// `Basic <api token>` resolves through the token cache, then the store.
/// `AccessToken <jwt>` is verified against the signing key and resolved by
/// subject. Anything else is `Unauthorized`.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> AppResult<AuthenticatedUser> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    let (scheme, value) = header.split_once(' ').ok_or(AppError::Unauthorized)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Unauthorized);
    }

    match scheme.to_ascii_lowercase().as_str() {
        SCHEME_API_TOKEN => {
            let user = resolve_api_token(state, value).await?;
            Ok(AuthenticatedUser {
                user: user.public(),
                api_token: Some(value.to_string()),
            })
        }
        SCHEME_ACCESS_TOKEN => {
            let uid = state.tokens.verify_access_token(value)?;
            let user = state
                .cache
                .get_user_by_id(uid)
                .await?
                .ok_or(AppError::Unauthorized)?;
            Ok(AuthenticatedUser {
                user: user.public(),
                api_token: None,
            })
        }
        _ => Err(AppError::Unauthorized),
    }
}

async fn resolve_api_token(state: &AppState, token: &str) -> AppResult<User> {
    match state.cache.get_user_by_token(token) {
        CacheEntry::Present(user) => return Ok(user),
        CacheEntry::Absent => return Err(AppError::Unauthorized),
        CacheEntry::Unset => {}
    }
    let ticket = state.cache.user_token_ticket();
    let user = state.store.verify_api_token(token).await?;
    state.cache.fill_user_by_token(token, ticket, user.clone());
    user.ok_or(AppError::Unauthorized)
}
