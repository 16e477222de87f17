//! Identity and credential domain models.
//!
//! `User` carries the password hash for internal auth flows; anything handed
//! to a client or attached to a request goes through `PublicUser`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{Node, Snowflake};

/// Domain user (identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: Snowflake,
    /// Lowercased, unique across all users.
    pub username: String,
    pub mail_address: Option<String>,
    pub display_name: String,
    /// Algorithm-tagged hash string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    /// Page ordering per scope (e.g. `"general"` or a champion name).
    #[serde(default)]
    pub page_order: HashMap<String, Vec<Snowflake>>,
}

impl User {
    /// Build a new user with a freshly generated id.
    pub fn new(username: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            uid: Snowflake::generate(Node::Users),
            username: username.to_lowercase(),
            mail_address: None,
            display_name: username.to_string(),
            password_hash,
            created: now,
            last_login: now,
            page_order: HashMap::new(),
        }
    }

    /// Apply a partial update. Empty fields are left untouched.
    pub fn apply(&mut self, update: UserUpdate) {
        if let Some(name) = update.display_name.filter(|n| !n.is_empty()) {
            self.display_name = name;
        }
        if let Some(username) = update.username.filter(|n| !n.is_empty()) {
            self.username = username.to_lowercase();
        }
        if let Some(hash) = update.password_hash.filter(|h| !h.is_empty()) {
            self.password_hash = hash;
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

/// Partial update of a `User`.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Client-facing view of a user, without credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub uid: Snowflake,
    pub username: String,
    pub mail_address: Option<String>,
    pub display_name: String,
    pub created: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub page_order: HashMap<String, Vec<Snowflake>>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            uid: u.uid,
            username: u.username.clone(),
            mail_address: u.mail_address.clone(),
            display_name: u.display_name.clone(),
            created: u.created,
            last_login: u.last_login,
            page_order: u.page_order.clone(),
        }
    }
}

/// Persisted refresh token. The token value doubles as lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Snowflake,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub token: String,
    pub user_id: Snowflake,
    pub deadline: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub last_access_client: String,
    pub last_access_ip: String,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// Strip the credential before handing the record to a client.
    pub fn sanitize(&mut self) {
        self.token.clear();
    }
}

/// Long-lived API token, one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToken {
    pub user_id: Snowflake,
    pub token: String,
    pub created: DateTime<Utc>,
}

/// Claims embedded in signed access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject — user id in decimal form.
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}
