//! Token service.
//!
//! Refresh tokens are opaque random strings persisted in the store and used as
//! their own lookup key. Access tokens are signed claim sets minted from a
//! valid refresh token and never persisted. API tokens are persisted, one per
//! user, and resolved through the cache.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, info};

use super::jwt::{SignedToken, SigningKey};
use super::{AuthError, AuthResult};
use crate::cache::Cache;
use crate::id::{Node, Snowflake};
use crate::models::{ApiToken, RefreshToken};
use crate::store::Store;

/// Random bytes in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 48;
/// Random bytes in an API token.
const API_TOKEN_BYTES: usize = 48;

pub const DEFAULT_ACCESS_LIFETIME: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_REFRESH_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_REMEMBER_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct Lifetimes {
    pub access: Duration,
    /// Refresh-token deadline without "remember me".
    pub refresh: Duration,
    /// Refresh-token deadline with "remember me".
    pub remember: Duration,
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_LIFETIME,
            refresh: DEFAULT_REFRESH_LIFETIME,
            remember: DEFAULT_REMEMBER_LIFETIME,
        }
    }
}

/// Audit data recorded on refresh-token use.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: String,
    pub addr: String,
}

/// URL-safe random token of `bytes` random bytes.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

pub struct TokenService {
    store: Arc<dyn Store>,
    cache: Arc<Cache>,
    key: SigningKey,
    lifetimes: Lifetimes,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<Cache>,
        key: SigningKey,
        lifetimes: Lifetimes,
    ) -> Self {
        Self {
            store,
            cache,
            key,
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> &Lifetimes {
        &self.lifetimes
    }

    /// Persist a new refresh token for `uid` and record the login.
    ///
    /// The caller sets the returned token as a cookie expiring at
    /// `deadline`.
    pub async fn create_and_set_refresh_token(
        &self,
        uid: Snowflake,
        remember: bool,
        client: &ClientInfo,
    ) -> AuthResult<RefreshToken> {
        let now = Utc::now();
        let lifetime = if remember {
            self.lifetimes.remember
        } else {
            self.lifetimes.refresh
        };
        let token = RefreshToken {
            id: Snowflake::generate(Node::RefreshTokens),
            token: random_token(REFRESH_TOKEN_BYTES),
            user_id: uid,
            deadline: now + chrono_duration(lifetime),
            last_access: now,
            last_access_client: client.user_agent.clone(),
            last_access_ip: client.addr.clone(),
        };
        self.store.set_refresh_token(&token).await?;
        self.record_login(uid).await?;
        debug!(uid = %uid, remember, "refresh token issued");
        Ok(token)
    }

    /// Write `last_login` alone, then drop the cached user so the next read
    /// sees the stored row.
    async fn record_login(&self, uid: Snowflake) -> AuthResult<()> {
        self.store.record_login(uid, Utc::now()).await?;
        self.cache.set_user_by_id(uid, None);
        Ok(())
    }

    /// Mint an access token from a presented refresh token.
    ///
    /// Unknown tokens are `Unauthorized`. Expired tokens are deleted, then
    /// rejected the same way.
    pub async fn obtain_access_token(
        &self,
        presented: &str,
        client: &ClientInfo,
    ) -> AuthResult<SignedToken> {
        if presented.is_empty() {
            return Err(AuthError::Unauthorized);
        }
        let Some(mut token) = self.store.get_refresh_token(presented).await? else {
            debug!("unknown refresh token");
            return Err(AuthError::Unauthorized);
        };
        let now = Utc::now();
        if token.is_expired_at(now) {
            self.store.remove_refresh_token(presented).await?;
            debug!(uid = %token.user_id, "expired refresh token purged");
            return Err(AuthError::Unauthorized);
        }

        token.last_access = now;
        token.last_access_client = client.user_agent.clone();
        token.last_access_ip = client.addr.clone();
        self.store.set_refresh_token(&token).await?;

        let uid = token.user_id;
        let mut issued_at = now;
        if let Some(revoked_at) = self.cache.revoked_since(uid)
            && issued_at.timestamp() <= revoked_at.timestamp()
        {
            // iat has whole-second precision; step past the revoked second.
            issued_at = DateTime::from_timestamp(revoked_at.timestamp() + 1, 0).unwrap_or(now);
        }
        self.key
            .sign_at(uid, issued_at, chrono_duration(self.lifetimes.access))
    }

    /// Resolve the subject of a signed access token.
    ///
    /// Tokens issued up to the second of a recorded revocation of their
    /// subject are rejected like any other unverifiable token.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<Snowflake> {
        let claims = self.key.verify(token)?;
        let uid = claims.subject()?;
        if let Some(revoked_at) = self.cache.revoked_since(uid)
            && claims.iat <= revoked_at.timestamp()
        {
            debug!(uid = %uid, "access token issued before revocation");
            return Err(AuthError::InvalidAccess);
        }
        Ok(uid)
    }

    /// Delete the refresh token. Outstanding access tokens stay valid until
    /// they expire.
    pub async fn logout(&self, presented: &str) -> AuthResult<()> {
        if presented.is_empty() {
            return Ok(());
        }
        self.store.remove_refresh_token(presented).await?;
        Ok(())
    }

    /// Revoke all refresh tokens of `uid` and deny its outstanding access
    /// tokens.
    pub async fn revoke_user(&self, uid: Snowflake) -> AuthResult<()> {
        self.store.remove_user_refresh_tokens(uid).await?;
        self.cache.revoke_subject(uid, Utc::now());
        info!(uid = %uid, "user sessions revoked");
        Ok(())
    }

    /// Issue a new API token for `uid`, replacing any existing one.
    pub async fn issue_api_token(&self, uid: Snowflake) -> AuthResult<ApiToken> {
        let previous = self.store.get_api_token(uid).await?;
        let token = ApiToken {
            user_id: uid,
            token: random_token(API_TOKEN_BYTES),
            created: Utc::now(),
        };
        self.store.set_api_token(&token).await?;
        if let Some(previous) = previous {
            self.cache.set_user_by_token(&previous.token, None);
        }
        Ok(token)
    }

    /// Delete the API token of `uid`, if any.
    pub async fn reset_api_token(&self, uid: Snowflake) -> AuthResult<()> {
        let previous = self.store.get_api_token(uid).await?;
        self.store.reset_api_token(uid).await?;
        if let Some(previous) = previous {
            self.cache.set_user_by_token(&previous.token, None);
        }
        Ok(())
    }

    /// Remove expired refresh tokens. Returns the count.
    pub async fn sweep_expired(&self) -> AuthResult<u64> {
        Ok(self.store.remove_expired_refresh_tokens(Utc::now()).await?)
    }
}
