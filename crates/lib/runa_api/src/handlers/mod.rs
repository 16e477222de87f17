//! Request handlers.

pub mod apitoken;
pub mod auth;
pub mod pages;
pub mod sessions;
pub mod users;
pub mod version;

use runa_core::id::Snowflake;

use crate::error::{AppError, AppResult};

/// Parse a decimal id path segment.
fn parse_id(raw: &str) -> AppResult<Snowflake> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id '{raw}'")))
}
