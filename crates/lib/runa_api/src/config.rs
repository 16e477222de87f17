//! API server configuration.

use std::time::Duration;

use runa_core::auth::tokens::{
    DEFAULT_ACCESS_LIFETIME, DEFAULT_REFRESH_LIFETIME, DEFAULT_REMEMBER_LIFETIME, Lifetimes,
};
use runa_core::cache::DEFAULT_CACHE_TTL;
use runa_core::store::timeout::DEFAULT_STORE_TIMEOUT;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL. In-memory store when unset.
    pub database_url: Option<String>,
    /// Release mode: secure cookies, compact JSON.
    pub release: bool,
    /// Access-token signing secret (base64 or raw, at least 32 bytes).
    pub jwt_secret: Option<String>,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub remember_lifetime: Duration,
    /// Failed-login budget: one attempt regained per interval.
    pub login_interval: Duration,
    pub login_burst: u32,
    pub cache_ttl: Duration,
    pub store_timeout: Duration,
    /// Period of the expired refresh-token sweep. Off when unset.
    pub sweep_interval: Option<Duration>,
    /// Period of the in-memory cleanup of expired cache entries and idle
    /// rate-limit buckets.
    pub housekeeping_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            database_url: None,
            release: false,
            jwt_secret: None,
            access_lifetime: DEFAULT_ACCESS_LIFETIME,
            refresh_lifetime: DEFAULT_REFRESH_LIFETIME,
            remember_lifetime: DEFAULT_REMEMBER_LIFETIME,
            login_interval: Duration::from_secs(60),
            login_burst: 5,
            cache_ttl: DEFAULT_CACHE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            sweep_interval: None,
            housekeeping_interval: Duration::from_secs(60),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default          |
    /// |------------------------------|------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3100` |
    /// | `DATABASE_URL`               | in-memory store  |
    /// | `RUNA_RELEASE`               | `false`          |
    /// | `JWT_SECRET`                 | random per start |
    /// | `ACCESS_TOKEN_TTL_SECS`      | `3600`           |
    /// | `STORE_TIMEOUT_SECS`         | `5`              |
    /// | `SWEEP_INTERVAL_SECS`        | off              |
    /// | `HOUSEKEEPING_INTERVAL_SECS` | `60`             |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            release: std::env::var("RUNA_RELEASE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            access_lifetime: env_secs("ACCESS_TOKEN_TTL_SECS").unwrap_or(defaults.access_lifetime),
            store_timeout: env_secs("STORE_TIMEOUT_SECS").unwrap_or(defaults.store_timeout),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS").filter(|d| !d.is_zero()),
            housekeeping_interval: env_secs("HOUSEKEEPING_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.housekeeping_interval),
            ..defaults
        }
    }

    pub fn lifetimes(&self) -> Lifetimes {
        Lifetimes {
            access: self.access_lifetime,
            refresh: self.refresh_lifetime,
            remember: self.remember_lifetime,
        }
    }
}
