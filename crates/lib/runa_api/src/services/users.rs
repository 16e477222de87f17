//! Self-service account changes. Both operations require the current password.

use runa_core::auth::password;
use runa_core::id::Snowflake;
use runa_core::models::{PublicUser, User, UserUpdate};
use runa_core::validation::{validate_password, validate_user};
use tracing::{debug, info};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::UserUpdateRequest;

/// Load the full user record and check `current_password` against it.
async fn authorize(state: &AppState, uid: Snowflake, current_password: &str) -> AppResult<User> {
    let user = state
        .cache
        .get_user_by_id(uid)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !password::verify_blocking(&user.password_hash, current_password).await {
        return Err(AppError::Unauthorized);
    }
    Ok(user)
}

/// Change username, display name or password.
///
/// A password change revokes every session of the user, including
/// outstanding access tokens.
pub async fn update_me(
    state: &AppState,
    uid: Snowflake,
    req: UserUpdateRequest,
) -> AppResult<PublicUser> {
    let mut user = authorize(state, uid, &req.current_password).await?;

    let password_changed = !req.new_password.is_empty();
    let password_hash = if password_changed {
        validate_password(&req.new_password)?;
        Some(state.hasher.hash_blocking(&req.new_password).await?)
    } else {
        None
    };

    user.apply(UserUpdate {
        username: Some(req.username),
        display_name: Some(req.display_name),
        password_hash,
    });
    validate_user(&user, false)?;

    state.store.edit_user(&user).await?;
    state.cache.set_user_by_id(uid, Some(user.clone()));

    if password_changed {
        state.tokens.revoke_user(uid).await?;
        info!(uid = %uid, "password changed");
    }
    Ok(user.public())
}

/// Longest accepted page-order scope name.
const MAX_SCOPE_LEN: usize = 64;

/// Replace one scope of the user's page ordering.
pub async fn set_page_order(
    state: &AppState,
    uid: Snowflake,
    scope: &str,
    order: &[Snowflake],
) -> AppResult<PublicUser> {
    if scope.is_empty() || scope.len() > MAX_SCOPE_LEN {
        return Err(AppError::BadRequest(format!(
            "scope must be 1 to {MAX_SCOPE_LEN} bytes"
        )));
    }
    state.store.set_page_order(uid, scope, order).await?;
    state.cache.set_user_by_id(uid, None);
    let user = state
        .cache
        .get_user_by_id(uid)
        .await?
        .ok_or(AppError::Unauthorized)?;
    debug!(uid = %uid, scope, pages = order.len(), "page order updated");
    Ok(user.public())
}

/// Delete the account with its pages, API token and sessions.
pub async fn delete_me(state: &AppState, uid: Snowflake, current_password: &str) -> AppResult<()> {
    authorize(state, uid, current_password).await?;

    state.store.delete_user_pages(uid).await?;
    state.tokens.reset_api_token(uid).await?;
    state.tokens.revoke_user(uid).await?;
    state.store.delete_user(uid).await?;
    state.cache.set_user_by_id(uid, None);

    info!(uid = %uid, "user deleted");
    Ok(())
}
