//! Refresh-token cookie.
//!
//! `HttpOnly; Path=/` with `Expires` matching the token deadline. Release mode
//! adds `Secure` and `SameSite=Strict`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "__session";

fn build(value: String, expires: OffsetDateTime, release: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .path("/")
        .expires(expires)
        .build();
    if release {
        cookie.set_secure(true);
        cookie.set_same_site(SameSite::Strict);
    }
    cookie
}

/// Cookie carrying a refresh token until `deadline`.
pub fn refresh_cookie(token: &str, deadline: DateTime<Utc>, release: bool) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(deadline.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    build(token.to_string(), expires, release)
}

/// Expired cookie clearing the refresh token.
pub fn clear_refresh_cookie(release: bool) -> Cookie<'static> {
    build(String::new(), OffsetDateTime::UNIX_EPOCH, release)
}
