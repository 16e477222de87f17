//! Domain models.

pub mod auth;
pub mod page;

pub use auth::{ApiToken, PublicUser, RefreshToken, TokenClaims, User, UserUpdate};
pub use page::Page;
