//! Store decorator bounding every call by a deadline. Operations that run
//! past it fail with [`StoreError::Timeout`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::{Store, StoreError, StoreResult, UserLookup};
use crate::id::Snowflake;
use crate::models::{ApiToken, Page, RefreshToken, User};

/// Default per-operation deadline.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: Store> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store operation timed out");
                Err(StoreError::Timeout(op))
            }
        }
    }
}

#[async_trait]
impl<S: Store> Store for TimeoutStore<S> {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        self.bounded("create_user", self.inner.create_user(user)).await
    }

    async fn get_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        self.bounded("get_user", self.inner.get_user(lookup)).await
    }

    async fn edit_user(&self, user: &User) -> StoreResult<()> {
        self.bounded("edit_user", self.inner.edit_user(user)).await
    }

    async fn record_login(&self, id: Snowflake, at: DateTime<Utc>) -> StoreResult<()> {
        self.bounded("record_login", self.inner.record_login(id, at)).await
    }

    async fn set_page_order(
        &self,
        id: Snowflake,
        scope: &str,
        order: &[Snowflake],
    ) -> StoreResult<()> {
        self.bounded("set_page_order", self.inner.set_page_order(id, scope, order))
            .await
    }

    async fn delete_user(&self, id: Snowflake) -> StoreResult<()> {
        self.bounded("delete_user", self.inner.delete_user(id)).await
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        self.bounded("get_refresh_token", self.inner.get_refresh_token(token))
            .await
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        self.bounded("set_refresh_token", self.inner.set_refresh_token(token))
            .await
    }

    async fn remove_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.bounded("remove_refresh_token", self.inner.remove_refresh_token(token))
            .await
    }

    async fn list_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<Vec<RefreshToken>> {
        self.bounded("list_refresh_tokens", self.inner.list_refresh_tokens(user_id))
            .await
    }

    async fn remove_refresh_token_by_id(
        &self,
        user_id: Snowflake,
        id: Snowflake,
    ) -> StoreResult<bool> {
        self.bounded(
            "remove_refresh_token_by_id",
            self.inner.remove_refresh_token_by_id(user_id, id),
        )
        .await
    }

    async fn remove_user_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<()> {
        self.bounded(
            "remove_user_refresh_tokens",
            self.inner.remove_user_refresh_tokens(user_id),
        )
        .await
    }

    async fn remove_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.bounded(
            "remove_expired_refresh_tokens",
            self.inner.remove_expired_refresh_tokens(now),
        )
        .await
    }

    async fn set_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        self.bounded("set_api_token", self.inner.set_api_token(token)).await
    }

    async fn get_api_token(&self, user_id: Snowflake) -> StoreResult<Option<ApiToken>> {
        self.bounded("get_api_token", self.inner.get_api_token(user_id)).await
    }

    async fn reset_api_token(&self, user_id: Snowflake) -> StoreResult<()> {
        self.bounded("reset_api_token", self.inner.reset_api_token(user_id))
            .await
    }

    async fn verify_api_token(&self, token: &str) -> StoreResult<Option<User>> {
        self.bounded("verify_api_token", self.inner.verify_api_token(token))
            .await
    }

    async fn create_page(&self, page: &Page) -> StoreResult<()> {
        self.bounded("create_page", self.inner.create_page(page)).await
    }

    async fn get_page(&self, id: Snowflake) -> StoreResult<Option<Page>> {
        self.bounded("get_page", self.inner.get_page(id)).await
    }

    async fn edit_page(&self, page: &Page) -> StoreResult<()> {
        self.bounded("edit_page", self.inner.edit_page(page)).await
    }

    async fn delete_page(&self, id: Snowflake) -> StoreResult<()> {
        self.bounded("delete_page", self.inner.delete_page(id)).await
    }

    async fn delete_user_pages(&self, owner: Snowflake) -> StoreResult<()> {
        self.bounded("delete_user_pages", self.inner.delete_user_pages(owner))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::counting::CountingStore;

    #[tokio::test]
    async fn fast_operations_pass_through() {
        let store = TimeoutStore::new(MemoryStore::new(), Duration::from_secs(1));
        let user = User::new("erin", "h".into());
        store.create_user(&user).await.unwrap();
        let found = store.get_user(UserLookup::Id(user.uid)).await.unwrap();
        assert_eq!(found.map(|u| u.uid), Some(user.uid));
    }

    #[tokio::test]
    async fn hung_backend_fails_with_timeout() {
        let slow = CountingStore::new(MemoryStore::new()).with_delay(Duration::from_millis(500));
        let store = TimeoutStore::new(slow, Duration::from_millis(20));
        let err = store.get_refresh_token("x").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout("get_refresh_token")));
    }
}
