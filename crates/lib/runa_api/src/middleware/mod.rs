//! Request middleware.

pub mod auth;
pub mod pretty;
pub mod rate_limit;
