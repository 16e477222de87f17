//! PostgreSQL implementation of [`Store`].
//!
//! Refresh tokens are persisted as SHA-256 hashes; the presented value is
//! hashed on every lookup and never written in clear.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use sqlx::types::Json;

use super::{Store, StoreError, StoreResult, UserLookup};
use crate::id::Snowflake;
use crate::models::{ApiToken, Page, RefreshToken, User};

type UserRow = (
    i64,
    String,
    Option<String>,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Json<HashMap<String, Vec<Snowflake>>>,
);

type RefreshTokenRow = (i64, i64, DateTime<Utc>, DateTime<Utc>, String, String);

type PageRow = (
    i64,
    i64,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Json<serde_json::Value>,
);

const USER_COLUMNS: &str = "id, username, mail_address, display_name, password_hash, \
     created_at, last_login, page_order";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// SHA-256 hash a refresh token for storage.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn user_from_row(row: UserRow) -> User {
    let (id, username, mail_address, display_name, password_hash, created, last_login, order) =
        row;
    User {
        uid: Snowflake::from_i64(id),
        username,
        mail_address,
        display_name,
        password_hash,
        created,
        last_login,
        page_order: order.0,
    }
}

fn refresh_token_from_row(token: String, row: RefreshTokenRow) -> RefreshToken {
    let (id, user_id, deadline, last_access, last_access_client, last_access_ip) = row;
    RefreshToken {
        id: Snowflake::from_i64(id),
        token,
        user_id: Snowflake::from_i64(user_id),
        deadline,
        last_access,
        last_access_client,
        last_access_ip,
    }
}

fn page_from_row(row: PageRow) -> Page {
    let (id, owner, title, created, edited, data) = row;
    Page {
        uid: Snowflake::from_i64(id),
        owner: Snowflake::from_i64(owner),
        title,
        created,
        edited,
        data: data.0,
    }
}

/// Map unique-constraint violations on `users.username` to `Conflict`.
fn map_user_write(e: sqlx::Error, username: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("username '{username}' already in use"))
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, mail_address, display_name, password_hash, \
             created_at, last_login, page_order) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.uid.get())
        .bind(&user.username)
        .bind(&user.mail_address)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.created)
        .bind(user.last_login)
        .bind(Json(&user.page_order))
        .execute(&self.pool)
        .await
        .map_err(|e| map_user_write(e, &user.username))?;
        Ok(())
    }

    async fn get_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        let row = match lookup {
            UserLookup::Id(id) => {
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
                ))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?
            }
            UserLookup::Name(name) => {
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users \
                     WHERE username = $1 OR (mail_address = $2 AND mail_address <> '') \
                     LIMIT 1"
                ))
                .bind(name.to_lowercase())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(user_from_row))
    }

    async fn edit_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET username = $2, mail_address = $3, display_name = $4, \
             password_hash = $5 WHERE id = $1",
        )
        .bind(user.uid.get())
        .bind(&user.username)
        .bind(&user.mail_address)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| map_user_write(e, &user.username))?;
        Ok(())
    }

    async fn record_login(&self, id: Snowflake, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id.get())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_page_order(
        &self,
        id: Snowflake,
        scope: &str,
        order: &[Snowflake],
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET page_order = jsonb_set(page_order, ARRAY[$2::text], $3) \
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(scope)
        .bind(Json(order))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Snowflake) -> StoreResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id, user_id, deadline, last_access, last_access_client, last_access_ip \
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| refresh_token_from_row(token.to_string(), r)))
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, token_hash, user_id, deadline, last_access, last_access_client, last_access_ip) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (token_hash) DO UPDATE SET \
             last_access = EXCLUDED.last_access, \
             last_access_client = EXCLUDED.last_access_client, \
             last_access_ip = EXCLUDED.last_access_ip",
        )
        .bind(token.id.get())
        .bind(hash_token(&token.token))
        .bind(token.user_id.get())
        .bind(token.deadline)
        .bind(token.last_access)
        .bind(&token.last_access_client)
        .bind(&token.last_access_ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_refresh_token(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<Vec<RefreshToken>> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id, user_id, deadline, last_access, last_access_client, last_access_ip \
             FROM refresh_tokens WHERE user_id = $1 ORDER BY last_access DESC",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| refresh_token_from_row(String::new(), r))
            .collect())
    }

    async fn remove_refresh_token_by_id(
        &self,
        user_id: Snowflake,
        id: Snowflake,
    ) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1 AND user_id = $2")
            .bind(id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_user_refresh_tokens(&self, user_id: Snowflake) -> StoreResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM refresh_tokens WHERE deadline < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn set_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO api_tokens (user_id, token, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, \
             created_at = EXCLUDED.created_at",
        )
        .bind(token.user_id.get())
        .bind(&token.token)
        .bind(token.created)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_api_token(&self, user_id: Snowflake) -> StoreResult<Option<ApiToken>> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT token, created_at FROM api_tokens WHERE user_id = $1",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token, created)| ApiToken {
            user_id,
            token,
            created,
        }))
    }

    async fn reset_api_token(&self, user_id: Snowflake) -> StoreResult<()> {
        sqlx::query("DELETE FROM api_tokens WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn verify_api_token(&self, token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.mail_address, u.display_name, u.password_hash, \
             u.created_at, u.last_login, u.page_order \
             FROM api_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn create_page(&self, page: &Page) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO pages (id, owner, title, created_at, edited_at, data) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(page.uid.get())
        .bind(page.owner.get())
        .bind(&page.title)
        .bind(page.created)
        .bind(page.edited)
        .bind(Json(&page.data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_page(&self, id: Snowflake) -> StoreResult<Option<Page>> {
        let row = sqlx::query_as::<_, PageRow>(
            "SELECT id, owner, title, created_at, edited_at, data FROM pages WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(page_from_row))
    }

    async fn edit_page(&self, page: &Page) -> StoreResult<()> {
        sqlx::query("UPDATE pages SET title = $2, edited_at = $3, data = $4 WHERE id = $1")
            .bind(page.uid.get())
            .bind(&page.title)
            .bind(page.edited)
            .bind(Json(&page.data))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_page(&self, id: Snowflake) -> StoreResult<()> {
        sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user_pages(&self, owner: Snowflake) -> StoreResult<()> {
        sqlx::query("DELETE FROM pages WHERE owner = $1")
            .bind(owner.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
