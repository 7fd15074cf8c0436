//! # CampusCart
//!
//! Authentication core for the CampusCart shop and learning platform.
//!
//! The surrounding storefront (products, carts, orders, courses, quizzes) is
//! plain record CRUD served elsewhere; this crate owns the one part of the
//! platform with real state and timing concerns: account registration gated
//! by one-time email codes, credential login with captcha escalation,
//! Google OAuth federation, password reset, and access/refresh token
//! issuance.
//!
//! ## Core Modules
//!
//! - [`auth`]: the authentication manager and its components (OTP lifecycle,
//!   pending registrations, failed-attempt tracking, password hashing, JWT
//!   issuance, captcha and OAuth clients)
//! - [`db`]: connection pooling plus repository traits with PostgreSQL and
//!   in-memory backends
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use campuscart::auth::{AuthManager, HttpMailer, MailerConfig, RecaptchaVerifier, TokenIssuer};
//! use campuscart::db::{Database, DatabaseConfig, PgOtpRepository, PgUserRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     let auth = AuthManager::new(
//!         Arc::new(PgUserRepository::new(db.pool().clone())),
//!         Arc::new(PgOtpRepository::new(db.pool().clone())),
//!         TokenIssuer::new("access secret".into(), "refresh secret".into()),
//!         Arc::new(RecaptchaVerifier::new("captcha secret".into())),
//!         Arc::new(HttpMailer::new(MailerConfig {
//!             api_url: "https://mail.example.com/v1/send".into(),
//!             api_key: "api key".into(),
//!             sender: "CampusCart <no-reply@campuscart.dev>".into(),
//!         })),
//!         None,
//!     );
//!     let _ = auth;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod db;

pub use auth::{AuthError, AuthManager, AuthResult};
