//! Authentication: credential hashing, access-token signing and the token
//! service that ties refresh tokens, access tokens and API tokens together.

pub mod jwt;
pub mod password;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;
use crate::validation::ValidationError;

/// Authentication errors.
///
/// Messages are safe to show to clients. Credential mismatches of any kind
/// collapse into `Unauthorized`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    /// The access token failed verification; the client should refresh it.
    #[error("invalid access key")]
    InvalidAccess,

    #[error("{0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            other => AuthError::Store(other),
        }
    }
}

impl From<ValidationError> for AuthError {
    fn from(e: ValidationError) -> Self {
        AuthError::BadRequest(e.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
