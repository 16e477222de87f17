//! Persistent store interface.
//!
//! Every "not found" case is `Ok(None)`; errors are reserved for I/O failure,
//! timeouts and constraint conflicts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::id::Snowflake;
use crate::models::{ApiToken, Page, RefreshToken, User};

#[cfg(any(test, feature = "test-util"))]
pub mod counting;
pub mod memory;
pub mod postgres;
pub mod timeout;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use timeout::TimeoutStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation `{0}` timed out")]
    Timeout(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How a user is looked up: by id, or by username / mail address.
#[derive(Debug, Clone, Copy)]
pub enum UserLookup<'a> {
    Id(Snowflake),
    /// Matches the lowercased username or the mail address.
    Name(&'a str),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new user. Fails with `Conflict` when the username is taken.
    async fn create_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<User>>;
    /// Write the profile fields (username, mail address, display name,
    /// password hash) of the user with the same id. `last_login` and
    /// `page_order` have their own targeted writes. Fails with `Conflict`
    /// when the new username belongs to someone else.
    async fn edit_user(&self, user: &User) -> StoreResult<()>;
    /// Set `last_login` and nothing else.
    async fn record_login(&self, id: Snowflake, at: DateTime<Utc>) -> StoreResult<()>;
    /// Replace the page order of one scope, keeping the other scopes.
    async fn set_page_order(
        &self,
        id: Snowflake,
        scope: &str,
        order: &[Snowflake],
    ) -> StoreResult<()>;
    async fn delete_user(&self, id: Snowflake) -> StoreResult<()>;

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>>;
    /// Upsert keyed by the token value.
    async fn set_refresh_token(&self, token: &RefreshToken) -> StoreResult<()>;
    async fn remove_refresh_token(&self, token: &str) -> StoreResult<()>;
    /// Refresh tokens of a user, token values sanitized.
    async fn list_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<Vec<RefreshToken>>;
    async fn remove_refresh_token_by_id(&self, user_id: Snowflake, id: Snowflake)
    -> StoreResult<bool>;
    async fn remove_user_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<()>;
    /// Delete every token whose deadline lies before `now`. Returns the count.
    async fn remove_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Upsert keyed by owner.
    async fn set_api_token(&self, token: &ApiToken) -> StoreResult<()>;
    async fn get_api_token(&self, user_id: Snowflake) -> StoreResult<Option<ApiToken>>;
    async fn reset_api_token(&self, user_id: Snowflake) -> StoreResult<()>;
    /// Resolve the owner of an API token value.
    async fn verify_api_token(&self, token: &str) -> StoreResult<Option<User>>;

    async fn create_page(&self, page: &Page) -> StoreResult<()>;
    async fn get_page(&self, id: Snowflake) -> StoreResult<Option<Page>>;
    async fn edit_page(&self, page: &Page) -> StoreResult<()>;
    async fn delete_page(&self, id: Snowflake) -> StoreResult<()>;
    async fn delete_user_pages(&self, owner: Snowflake) -> StoreResult<()>;
}
