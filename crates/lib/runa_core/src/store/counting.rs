//! Test decorator recording how often each store operation was called.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{Store, StoreResult, UserLookup};
use crate::id::Snowflake;
use crate::models::{ApiToken, Page, RefreshToken, User};

/// Wraps a store, counts calls per operation and optionally delays each one.
///
/// Cloning shares the counters, so a test can keep a handle after moving the
/// store into application state.
pub struct CountingStore<S> {
    inner: Arc<S>,
    calls: Arc<DashMap<&'static str, usize>>,
    delay: Option<Duration>,
}

impl<S> Clone for CountingStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            calls: Arc::clone(&self.calls),
            delay: self.delay,
        }
    }
}

impl<S: Store> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Arc::new(DashMap::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls recorded for one operation.
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// Calls recorded across all operations.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|e| *e.value()).sum()
    }

    pub fn reset(&self) {
        self.calls.clear();
    }

    async fn record(&self, op: &'static str) {
        *self.calls.entry(op).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<S: Store> Store for CountingStore<S> {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        self.record("create_user").await;
        self.inner.create_user(user).await
    }

    async fn get_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        self.record("get_user").await;
        self.inner.get_user(lookup).await
    }

    async fn edit_user(&self, user: &User) -> StoreResult<()> {
        self.record("edit_user").await;
        self.inner.edit_user(user).await
    }

    async fn record_login(&self, id: Snowflake, at: DateTime<Utc>) -> StoreResult<()> {
        self.record("record_login").await;
        self.inner.record_login(id, at).await
    }

    async fn set_page_order(
        &self,
        id: Snowflake,
        scope: &str,
        order: &[Snowflake],
    ) -> StoreResult<()> {
        self.record("set_page_order").await;
        self.inner.set_page_order(id, scope, order).await
    }

    async fn delete_user(&self, id: Snowflake) -> StoreResult<()> {
        self.record("delete_user").await;
        self.inner.delete_user(id).await
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        self.record("get_refresh_token").await;
        self.inner.get_refresh_token(token).await
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        self.record("set_refresh_token").await;
        self.inner.set_refresh_token(token).await
    }

    async fn remove_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.record("remove_refresh_token").await;
        self.inner.remove_refresh_token(token).await
    }

    async fn list_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<Vec<RefreshToken>> {
        self.record("list_refresh_tokens").await;
        self.inner.list_refresh_tokens(user_id).await
    }

    async fn remove_refresh_token_by_id(
        &self,
        user_id: Snowflake,
        id: Snowflake,
    ) -> StoreResult<bool> {
        self.record("remove_refresh_token_by_id").await;
        self.inner.remove_refresh_token_by_id(user_id, id).await
    }

    async fn remove_user_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<()> {
        self.record("remove_user_refresh_tokens").await;
        self.inner.remove_user_refresh_tokens(user_id).await
    }

    async fn remove_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.record("remove_expired_refresh_tokens").await;
        self.inner.remove_expired_refresh_tokens(now).await
    }

    async fn set_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        self.record("set_api_token").await;
        self.inner.set_api_token(token).await
    }

    async fn get_api_token(&self, user_id: Snowflake) -> StoreResult<Option<ApiToken>> {
        self.record("get_api_token").await;
        self.inner.get_api_token(user_id).await
    }

    async fn reset_api_token(&self, user_id: Snowflake) -> StoreResult<()> {
        self.record("reset_api_token").await;
        self.inner.reset_api_token(user_id).await
    }

    async fn verify_api_token(&self, token: &str) -> StoreResult<Option<User>> {
        self.record("verify_api_token").await;
        self.inner.verify_api_token(token).await
    }

    async fn create_page(&self, page: &Page) -> StoreResult<()> {
        self.record("create_page").await;
        self.inner.create_page(page).await
    }

    async fn get_page(&self, id: Snowflake) -> StoreResult<Option<Page>> {
        self.record("get_page").await;
        self.inner.get_page(id).await
    }

    async fn edit_page(&self, page: &Page) -> StoreResult<()> {
        self.record("edit_page").await;
        self.inner.edit_page(page).await
    }

    async fn delete_page(&self, id: Snowflake) -> StoreResult<()> {
        self.record("delete_page").await;
        self.inner.delete_page(id).await
    }

    async fn delete_user_pages(&self, owner: Snowflake) -> StoreResult<()> {
        self.record("delete_user_pages").await;
        self.inner.delete_user_pages(owner).await
    }
}
