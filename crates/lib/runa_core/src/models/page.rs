//! Page entity. The page body is opaque to this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{Node, Snowflake};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub uid: Snowflake,
    pub owner: Snowflake,
    pub title: String,
    pub created: DateTime<Utc>,
    pub edited: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Page {
    pub fn new(owner: Snowflake, title: String, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            uid: Snowflake::generate(Node::Pages),
            owner,
            title,
            created: now,
            edited: now,
            data,
        }
    }
}
