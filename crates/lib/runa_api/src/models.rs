//! Request and response bodies.

use chrono::{DateTime, Utc};
use runa_core::id::Snowflake;
use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Username or mail address.
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    #[serde(rename = "accesstoken")]
    pub access_token: String,
    pub deadline: DateTime<Utc>,
}

/// Body of `POST /api/users/me` and `DELETE /api/users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdateRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub new_password: String,
    pub current_password: String,
}

/// Body of `POST /api/users/me/pageorder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOrderRequest {
    #[serde(rename = "pageorder")]
    pub page_order: Vec<Snowflake>,
}

/// Query of `POST /api/users/me/pageorder`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageOrderQuery {
    /// Which ordering to replace. Defaults to [`DEFAULT_PAGE_ORDER_SCOPE`].
    pub scope: Option<String>,
}

pub const DEFAULT_PAGE_ORDER_SCOPE: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub title: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub release: bool,
}
