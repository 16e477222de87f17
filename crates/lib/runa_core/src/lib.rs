//! # runa_core
//!
//! Identity, credential, cache and rate-limit logic for Runa.

pub mod auth;
pub mod cache;
pub mod id;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod store;
pub mod validation;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
