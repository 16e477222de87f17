//! Username and password rules applied before anything is persisted.

use thiserror::Error;

use crate::models::User;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid username")]
    InvalidUsername,

    #[error("password must be at least {PASSWORD_MIN_LEN} characters")]
    PasswordTooShort,
}

fn username_char_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Validate a user before it is written.
///
/// `accept_empty_username` is set on partial updates where an empty username
/// means "leave unchanged".
pub fn validate_user(user: &User, accept_empty_username: bool) -> Result<(), ValidationError> {
    validate_username(&user.username, accept_empty_username)
}

pub fn validate_username(username: &str, accept_empty: bool) -> Result<(), ValidationError> {
    if username.is_empty() {
        return if accept_empty {
            Ok(())
        } else {
            Err(ValidationError::InvalidUsername)
        };
    }
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len)
        || !username.chars().all(username_char_allowed)
    {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}
