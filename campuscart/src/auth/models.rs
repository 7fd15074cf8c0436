//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// User ID type
pub type UserId = i64;

/// Account record as stored.
///
/// Deliberately not `Serialize`: everything returned to a client goes
/// through [`PublicUser`] so the password hash can never leak through an
/// accidental `Json(user)`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    /// `None` for federated (Google) accounts
    pub password_hash: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The one projection of an account that crosses the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            created_at: user.created_at,
        }
    }
}

/// Fields for account creation
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub role: String,
}

/// Why a one-time code was issued; scopes lookups and post-verification
/// effects (registration codes are consumed, reset codes are retained
/// until the password is actually reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OtpPurpose {
    Registration,
    ResetPassword,
}

impl Default for OtpPurpose {
    fn default() -> Self {
        OtpPurpose::Registration
    }
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
            OtpPurpose::ResetPassword => "reset-password",
        }
    }
}

/// A live one-time code for an (email, purpose) pair
#[derive(Debug, Clone)]
pub struct OneTimeCode {
    pub email: String,
    pub purpose: OtpPurpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub verified: bool,
}

/// An unconfirmed account draft awaiting OTP confirmation
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub staged_at: Instant,
}

/// Registration request (first step)
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub captcha_token: String,
}

/// Result of staging a registration: the opaque id the client must echo
/// back together with the emailed code.
#[derive(Debug, Clone, Serialize)]
pub struct StagedRegistration {
    pub registration_id: String,
    pub email: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Email or username
    pub identifier: String,
    pub password: String,
    pub captcha_token: Option<String>,
}

/// Access/refresh token pair minted for a session
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signed claims carried by both token classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

/// Which signing secret a token must verify against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Profile returned by Google's tokeninfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_omits_password_hash() {
        let user = User {
            id: 7,
            email: "a@b.com".to_string(),
            username: "alice".to_string(),
            password_hash: Some("$argon2id$...".to_string()),
            role: "user".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let public = PublicUser::from(&user);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
        assert!(json.contains("alice"));
    }

    #[test]
    fn purpose_serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&OtpPurpose::ResetPassword).unwrap(),
            "\"reset-password\""
        );
        let parsed: OtpPurpose = serde_json::from_str("\"registration\"").unwrap();
        assert_eq!(parsed, OtpPurpose::Registration);
        assert_eq!(parsed.as_str(), "registration");
    }
}
