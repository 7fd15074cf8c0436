//! Authentication: OTP-gated registration, credential and Google login,
//! token issuance and refresh, password reset.
//!
//! [`AuthManager`] is the entry point; everything else in this module is a
//! component it composes. Storage ([`crate::db`]), captcha verification,
//! and code delivery are trait objects so the manager runs unchanged
//! against PostgreSQL in production and in-memory fakes in tests.

pub mod captcha;
pub mod errors;
pub mod google;
pub mod mailer;
pub mod manager;
pub mod models;
pub mod otp;
pub mod password;
pub mod pending;
pub mod throttle;
pub mod tokens;

pub use captcha::{CaptchaVerifier, RecaptchaVerifier};
pub use errors::{AuthError, AuthResult};
pub use google::{GoogleOAuth, GoogleOAuthConfig};
pub use mailer::{CodeDispatcher, HttpMailer, MailerConfig};
pub use manager::AuthManager;
pub use models::{
    Claims, GoogleProfile, LoginRequest, NewUser, OneTimeCode, OtpPurpose, PendingRegistration,
    PublicUser, RegisterRequest, SessionTokens, StagedRegistration, TokenKind, User, UserId,
};
pub use otp::OtpService;
pub use pending::PendingRegistrations;
pub use throttle::FailedAttempts;
pub use tokens::TokenIssuer;
