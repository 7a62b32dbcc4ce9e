//! Authentication validator
//!
//! Implements the credential side of the login state machine. Session state
//! transitions themselves live in `client::state`.

use crate::config::ServerConfig;
use crate::error::AuthError;

/// Username that logs in without a password when anonymous access is on
pub const ANONYMOUS_USER: &str = "anonymous";

/// What a USER command leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// Logged in immediately, no PASS needed
    Anonymous,
    /// Username recorded, PASS must follow
    PasswordRequired,
}

/// Decides how a USER command proceeds.
///
/// Any name other than an enabled anonymous login is accepted here and only
/// checked once the password arrives, so unknown names are not revealed.
pub fn validate_user(username: &str, config: &ServerConfig) -> UserOutcome {
    if config.anonymous_enabled && username == ANONYMOUS_USER {
        UserOutcome::Anonymous
    } else {
        UserOutcome::PasswordRequired
    }
}

/// Validates the password for the username recorded by a previous USER.
pub fn validate_password(
    pending_username: Option<&str>,
    password: &str,
    config: &ServerConfig,
) -> Result<(), AuthError> {
    let username = pending_username.ok_or(AuthError::NoPendingUser)?;

    if username != config.username {
        return Err(AuthError::UnknownUser(username.to_string()));
    }

    if password != config.password {
        return Err(AuthError::InvalidPassword(username.to_string()));
    }

    Ok(())
}
