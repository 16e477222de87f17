//! In-memory implementation of [`Store`].
//!
//! Not durable: all state is lost on restart. Used for local development, for
//! deployments without a database URL, and by the test suites. Each collection
//! sits behind its own `tokio::sync::RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult, UserLookup};
use crate::id::Snowflake;
use crate::models::{ApiToken, Page, RefreshToken, User};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Snowflake, User>>,
    refresh_tokens: RwLock<HashMap<String, RefreshToken>>,
    api_tokens: RwLock<HashMap<Snowflake, ApiToken>>,
    pages: RwLock<HashMap<Snowflake, Page>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn username_taken(users: &HashMap<Snowflake, User>, username: &str, except: Snowflake) -> bool {
    users
        .values()
        .any(|u| u.uid != except && u.username == username)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if username_taken(&users, &user.username, user.uid) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already in use",
                user.username
            )));
        }
        users.insert(user.uid, user.clone());
        Ok(())
    }

    async fn get_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(match lookup {
            UserLookup::Id(id) => users.get(&id).cloned(),
            UserLookup::Name(name) => {
                let lowered = name.to_lowercase();
                users
                    .values()
                    .find(|u| {
                        u.username == lowered || u.mail_address.as_deref() == Some(name)
                    })
                    .cloned()
            }
        })
    }

    async fn edit_user(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if username_taken(&users, &user.username, user.uid) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already in use",
                user.username
            )));
        }
        if let Some(existing) = users.get_mut(&user.uid) {
            existing.username = user.username.clone();
            existing.mail_address = user.mail_address.clone();
            existing.display_name = user.display_name.clone();
            existing.password_hash = user.password_hash.clone();
        }
        Ok(())
    }

    async fn record_login(&self, id: Snowflake, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login = at;
        }
        Ok(())
    }

    async fn set_page_order(
        &self,
        id: Snowflake,
        scope: &str,
        order: &[Snowflake],
    ) -> StoreResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.page_order.insert(scope.to_string(), order.to_vec());
        }
        Ok(())
    }

    async fn delete_user(&self, id: Snowflake) -> StoreResult<()> {
        self.users.write().await.remove(&id);
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.read().await.get(token).cloned())
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        self.refresh_tokens
            .write()
            .await
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn remove_refresh_token(&self, token: &str) -> StoreResult<()> {
        self.refresh_tokens.write().await.remove(token);
        Ok(())
    }

    async fn list_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<Vec<RefreshToken>> {
        let tokens = self.refresh_tokens.read().await;
        let mut out: Vec<RefreshToken> = tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .map(|mut t| {
                t.sanitize();
                t
            })
            .collect();
        out.sort_by(|a, b| b.last_access.cmp(&a.last_access));
        Ok(out)
    }

    async fn remove_refresh_token_by_id(
        &self,
        user_id: Snowflake,
        id: Snowflake,
    ) -> StoreResult<bool> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !(t.id == id && t.user_id == user_id));
        Ok(tokens.len() != before)
    }

    async fn remove_user_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<()> {
        self.refresh_tokens
            .write()
            .await
            .retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    async fn remove_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }

    async fn set_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        self.api_tokens
            .write()
            .await
            .insert(token.user_id, token.clone());
        Ok(())
    }

    async fn get_api_token(&self, user_id: Snowflake) -> StoreResult<Option<ApiToken>> {
        Ok(self.api_tokens.read().await.get(&user_id).cloned())
    }

    async fn reset_api_token(&self, user_id: Snowflake) -> StoreResult<()> {
        self.api_tokens.write().await.remove(&user_id);
        Ok(())
    }

    async fn verify_api_token(&self, token: &str) -> StoreResult<Option<User>> {
        let owner = self
            .api_tokens
            .read()
            .await
            .values()
            .find(|t| t.token == token)
            .map(|t| t.user_id);
        match owner {
            Some(uid) => self.get_user(UserLookup::Id(uid)).await,
            None => Ok(None),
        }
    }

    async fn create_page(&self, page: &Page) -> StoreResult<()> {
        self.pages.write().await.insert(page.uid, page.clone());
        Ok(())
    }

    async fn get_page(&self, id: Snowflake) -> StoreResult<Option<Page>> {
        Ok(self.pages.read().await.get(&id).cloned())
    }

    async fn edit_page(&self, page: &Page) -> StoreResult<()> {
        if let Some(existing) = self.pages.write().await.get_mut(&page.uid) {
            *existing = page.clone();
        }
        Ok(())
    }

    async fn delete_page(&self, id: Snowflake) -> StoreResult<()> {
        self.pages.write().await.remove(&id);
        Ok(())
    }

    async fn delete_user_pages(&self, owner: Snowflake) -> StoreResult<()> {
        self.pages.write().await.retain(|_, p| p.owner != owner);
        Ok(())
    }
}
