//! Password hashing.
//!
//! New hashes use Argon2id with parallelism scaled to the host. Legacy bcrypt
//! hashes still verify so existing accounts keep working; callers can check
//! [`needs_rehash`] after a successful login and upgrade in place.

use std::num::NonZeroUsize;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use tracing::warn;

use super::{AuthError, AuthResult};

/// Argon2id memory cost in KiB.
const ARGON2_M_COST: u32 = 19 * 1024;
/// Argon2id iterations.
const ARGON2_T_COST: u32 = 2;
/// Upper bound on lanes regardless of core count.
const ARGON2_MAX_LANES: u32 = 8;
/// Cost used by the legacy scheme when it was current.
pub const BCRYPT_COST: u32 = 12;

/// Supported hash formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Bcrypt,
    Argon2id,
}

type VerifyFn = fn(&str, &str) -> Result<bool, String>;

struct SchemeEntry {
    scheme: HashScheme,
    prefixes: &'static [&'static str],
    verify: VerifyFn,
}

/// Hash prefix -> verifier.
const SCHEMES: &[SchemeEntry] = &[
    SchemeEntry {
        scheme: HashScheme::Argon2id,
        prefixes: &["$argon2id$"],
        verify: verify_argon2,
    },
    SchemeEntry {
        scheme: HashScheme::Bcrypt,
        prefixes: &["$2a$", "$2b$", "$2x$", "$2y$"],
        verify: verify_bcrypt,
    },
];

impl HashScheme {
    /// Scheme used for new hashes.
    pub const CURRENT: HashScheme = HashScheme::Argon2id;

    /// Identify the scheme from the hash prefix.
    pub fn detect(hash: &str) -> Option<HashScheme> {
        find_entry(hash).map(|e| e.scheme)
    }
}

fn find_entry(hash: &str) -> Option<&'static SchemeEntry> {
    SCHEMES
        .iter()
        .find(|e| e.prefixes.iter().any(|p| hash.starts_with(p)))
}

fn verify_argon2(hash: &str, password: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| e.to_string())?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.to_string()),
    }
}

fn verify_bcrypt(hash: &str, password: &str) -> Result<bool, String> {
    bcrypt::verify(password, hash).map_err(|e| e.to_string())
}

/// Argon2id hasher with parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    /// Default cost, lanes scaled to available parallelism.
    pub fn new() -> AuthResult<Self> {
        let lanes = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(ARGON2_MAX_LANES as usize) as u32;
        Self::with_params(ARGON2_M_COST, ARGON2_T_COST, lanes)
    }

    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> AuthResult<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| AuthError::Internal(format!("argon2 params: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produce a self-describing PHC hash string.
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let mut salt = [0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| AuthError::Internal(format!("argon2 salt: {e}")))?;
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Internal(format!("argon2 hash: {e}")))
    }

    /// Hash on the blocking pool.
    pub async fn hash_blocking(&self, password: &str) -> AuthResult<String> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
    }
}

/// Check `password` against a stored hash of any supported scheme.
///
/// Unknown or malformed hashes fail closed.
pub fn verify(hash: &str, password: &str) -> bool {
    let Some(entry) = find_entry(hash) else {
        warn!("password hash has unknown scheme");
        return false;
    };
    match (entry.verify)(hash, password) {
        Ok(ok) => ok,
        Err(e) => {
            warn!(scheme = ?entry.scheme, error = %e, "malformed password hash");
            false
        }
    }
}

/// [`verify`] on the blocking pool.
pub async fn verify_blocking(hash: &str, password: &str) -> bool {
    let hash = hash.to_string();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify(&hash, &password))
        .await
        .unwrap_or(false)
}

/// Whether a stored hash should be replaced with one of the current scheme.
pub fn needs_rehash(hash: &str) -> bool {
    HashScheme::detect(hash) != Some(HashScheme::CURRENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Hasher {
        Hasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hash = cheap().hash("password123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify(&hash, "password123"));
        assert!(!verify(&hash, "password123x"));
    }

    #[test]
    fn salts_differ() {
        let h = cheap();
        assert_ne!(h.hash("same").unwrap(), h.hash("same").unwrap());
    }

    #[test]
    fn legacy_bcrypt_still_verifies() {
        let legacy = bcrypt::hash("hunter22", 4).unwrap();
        assert_eq!(HashScheme::detect(&legacy), Some(HashScheme::Bcrypt));
        assert!(verify(&legacy, "hunter22"));
        assert!(!verify(&legacy, "hunter23"));
        assert!(needs_rehash(&legacy));
    }

    #[test]
    fn unknown_scheme_fails_closed() {
        assert!(!verify("plaintext", "plaintext"));
        assert!(!verify("$argon2id$garbage", "x"));
        assert!(!verify("", ""));
        assert!(needs_rehash("plaintext"));
    }

    #[test]
    fn default_params_are_accepted() {
        let hasher = Hasher::new().unwrap();
        assert!(!needs_rehash(&hasher.hash("pw").unwrap()));
    }

    #[tokio::test]
    async fn blocking_variants_agree() {
        let hash = cheap().hash_blocking("pw").await.unwrap();
        assert!(verify_blocking(&hash, "pw").await);
        assert!(!verify_blocking(&hash, "nope").await);
    }
}
