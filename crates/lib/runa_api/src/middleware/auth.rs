//! Authentication middleware.
//!
//! Resolves the caller from the `Authorization` header and injects
//! [`AuthenticatedUser`] into request extensions. Any failure ends the request
//! here; downstream handlers never run.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::auth::resolve_identity;

pub use crate::services::auth::AuthenticatedUser;

/// Axum middleware: `Basic <api token>` or `AccessToken <jwt>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = resolve_identity(&state, request.headers()).await?;
    debug!(
        uid = %identity.user.uid,
        api_token = identity.api_token.is_some(),
        "request authenticated"
    );
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
