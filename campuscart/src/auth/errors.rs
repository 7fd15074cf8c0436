//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Bad identifier or password; deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Username already exists
    #[error("Username already exists")]
    UsernameTaken,

    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    /// Password too weak
    #[error("{0}")]
    WeakPassword(String),

    /// No live code for this (email, purpose), or it was already consumed
    #[error("OTP not found or expired")]
    OtpNotFound,

    /// Code past its expiry
    #[error("OTP has expired")]
    OtpExpired,

    /// Attempt counter exhausted
    #[error("Too many invalid attempts")]
    OtpTooManyAttempts,

    /// Submitted code does not match
    #[error("Invalid OTP")]
    OtpInvalid,

    /// Reset requested without a prior verified code
    #[error("Please verify your OTP first")]
    OtpNotVerified,

    /// Unknown, already promoted, or swept registration id
    #[error("Invalid or expired registration session")]
    InvalidSession,

    /// Captcha token required but not supplied
    #[error("Please complete the captcha verification")]
    CaptchaRequired,

    /// Captcha service rejected the token (or was unreachable; fail-closed)
    #[error("Captcha verification failed")]
    CaptchaFailed,

    /// Notification channel rejected the message or timed out
    #[error("Failed to send OTP email: {0}")]
    Dispatch(String),

    /// External service (OAuth, captcha transport) failure
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Invalid, expired, or missing token
    #[error("Authentication required")]
    Unauthenticated,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak internals
    ///
    /// Database, dispatch, and upstream errors carry connection strings,
    /// hostnames, and provider responses that must not reach clients.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) => "Internal server error".to_string(),
            AuthError::HashingFailed => "Internal server error".to_string(),
            AuthError::Dispatch(_) => "Failed to send OTP email".to_string(),
            AuthError::Upstream(_) => "Upstream service error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_sanitized() {
        let err = AuthError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.client_message(), "Internal server error");
        assert_ne!(err.to_string(), err.client_message());
    }

    #[test]
    fn dispatch_errors_hide_provider_detail() {
        let err = AuthError::Dispatch("relay.internal:2525 refused".to_string());
        assert_eq!(err.client_message(), "Failed to send OTP email");
    }

    #[test]
    fn domain_errors_pass_through() {
        assert_eq!(
            AuthError::OtpTooManyAttempts.client_message(),
            "Too many invalid attempts"
        );
        assert_eq!(
            AuthError::InvalidCredentials.client_message(),
            "Invalid credentials"
        );
    }
}
