//! Access-token signing and verification (HS256).

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use tracing::{debug, info, warn};

use super::{AuthError, AuthResult};
use crate::id::Snowflake;
use crate::models::TokenClaims;

/// Minimum key length in bytes (256 bits).
pub const MIN_KEY_LEN: usize = 32;
/// Length of a generated key in bytes.
const GENERATED_KEY_LEN: usize = 64;

/// Process-wide HMAC key. Read-only after construction.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl SigningKey {
    /// Use `secret` as the key. Fails when shorter than [`MIN_KEY_LEN`].
    pub fn from_bytes(secret: &[u8]) -> AuthResult<Self> {
        if secret.len() < MIN_KEY_LEN {
            return Err(AuthError::Internal(format!(
                "signing key must be at least {MIN_KEY_LEN} bytes"
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let mut secret = [0u8; GENERATED_KEY_LEN];
        rand::rng().fill_bytes(&mut secret);
        Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        }
    }

    /// Resolve a configured secret: base64 first, then raw bytes. Without a
    /// usable secret a random key is generated, so tokens do not survive a
    /// restart.
    pub fn from_config(secret: Option<&str>) -> Self {
        let Some(secret) = secret.filter(|s| !s.is_empty()) else {
            info!("no signing secret configured, generated a random key");
            return Self::generate();
        };
        let bytes = STANDARD
            .decode(secret)
            .ok()
            .filter(|b| b.len() >= MIN_KEY_LEN)
            .unwrap_or_else(|| secret.as_bytes().to_vec());
        match Self::from_bytes(&bytes) {
            Ok(key) => key,
            Err(_) => {
                warn!(
                    min_bytes = MIN_KEY_LEN,
                    "configured signing secret too short, generated a random key"
                );
                Self::generate()
            }
        }
    }

    /// Sign a claim set for `uid` valid for `lifetime`.
    pub fn sign(&self, uid: Snowflake, lifetime: Duration) -> AuthResult<SignedToken> {
        self.sign_at(uid, Utc::now(), lifetime)
    }

    /// Sign a claim set for `uid` issued at `issued_at`.
    pub fn sign_at(
        &self,
        uid: Snowflake,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> AuthResult<SignedToken> {
        let expires_at = issued_at + lifetime;
        let claims = TokenClaims {
            sub: uid.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok(SignedToken { token, expires_at })
    }

    /// Check signature and expiry. Any failure is `InvalidAccess`.
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "access token rejected");
                AuthError::InvalidAccess
            })
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Subject as a user id.
    pub fn subject(&self) -> AuthResult<Snowflake> {
        self.sub.parse().map_err(|_| AuthError::InvalidAccess)
    }
}
