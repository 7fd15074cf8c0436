//! The authentication manager.
//!
//! Owns every account flow end to end: OTP-gated registration, credential
//! login with captcha escalation, Google OAuth federation, token refresh
//! with rotation, and password reset. Storage, captcha, and mail delivery
//! sit behind traits so the whole manager runs against in-memory fakes in
//! tests.

use std::sync::Arc;
use std::time::Instant;

use crate::db::{OtpRepository, UserRepository};

use super::captcha::CaptchaVerifier;
use super::errors::{AuthError, AuthResult};
use super::google::GoogleOAuth;
use super::mailer::CodeDispatcher;
use super::models::{
    Claims, LoginRequest, NewUser, OtpPurpose, PendingRegistration, PublicUser, RegisterRequest,
    SessionTokens, StagedRegistration, TokenKind, User, UserId,
};
use super::otp::OtpService;
use super::password;
use super::pending::PendingRegistrations;
use super::throttle::FailedAttempts;
use super::tokens::TokenIssuer;

/// Role assigned to every self-registered account
const DEFAULT_ROLE: &str = "user";

/// Coordinates the account flows over pluggable storage and side channels
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    otp: OtpService,
    tokens: TokenIssuer,
    captcha: Arc<dyn CaptchaVerifier>,
    dispatcher: Arc<dyn CodeDispatcher>,
    google: Option<GoogleOAuth>,
    pending: PendingRegistrations,
    throttle: FailedAttempts,
}

impl AuthManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        otp_repo: Arc<dyn OtpRepository>,
        tokens: TokenIssuer,
        captcha: Arc<dyn CaptchaVerifier>,
        dispatcher: Arc<dyn CodeDispatcher>,
        google: Option<GoogleOAuth>,
    ) -> Self {
        Self {
            users,
            otp: OtpService::new(otp_repo),
            tokens,
            captcha,
            dispatcher,
            google,
            pending: PendingRegistrations::new(),
            throttle: FailedAttempts::new(),
        }
    }

    // ===== Registration =====

    /// Stage a registration: captcha, uniqueness and strength checks, then
    /// park the hashed draft and email a code. No account row exists until
    /// [`complete_registration`](Self::complete_registration).
    pub async fn register_pending(
        &self,
        request: RegisterRequest,
        client_ip: &str,
    ) -> AuthResult<StagedRegistration> {
        let email = normalize_email(&request.email)?;
        let username = validate_username(&request.username)?;

        self.captcha.verify(&request.captcha_token, client_ip).await?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        password::validate_strength(&request.password)?;
        let password_hash = password::hash(&request.password)?;

        let registration_id = self.pending.stage(PendingRegistration {
            email: email.clone(),
            username,
            password_hash,
            staged_at: Instant::now(),
        });

        let code = self.otp.issue(&email, OtpPurpose::Registration).await?;
        self.dispatcher
            .dispatch(&email, OtpPurpose::Registration, &code)
            .await?;

        tracing::info!(email, "registration staged, verification code sent");
        Ok(StagedRegistration {
            registration_id,
            email,
        })
    }

    /// Complete a staged registration by presenting the emailed code.
    ///
    /// The code is checked before the draft is consumed, so a wrong guess
    /// burns an OTP attempt but keeps the draft claimable.
    pub async fn complete_registration(
        &self,
        registration_id: &str,
        code: &str,
    ) -> AuthResult<(PublicUser, SessionTokens)> {
        let email = self
            .pending
            .email_for(registration_id)
            .ok_or(AuthError::InvalidSession)?;

        self.otp.verify(&email, OtpPurpose::Registration, code).await?;

        let draft = self
            .pending
            .take(registration_id)
            .ok_or(AuthError::InvalidSession)?;

        // The window between staging and completion leaves room for someone
        // else to claim the email or username.
        if self.users.find_by_email(&draft.email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        if self.users.find_by_username(&draft.username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let user = self
            .users
            .create(NewUser {
                email: draft.email,
                username: draft.username,
                password_hash: Some(draft.password_hash),
                role: DEFAULT_ROLE.to_string(),
            })
            .await?;

        tracing::info!(user_id = user.id, "registration completed");
        let session = self.tokens.issue_session(&user)?;
        Ok((PublicUser::from(&user), session))
    }

    // ===== Login =====

    /// Whether the next login attempt from this (client IP, identifier)
    /// must carry a captcha token
    pub fn requires_captcha(&self, client_ip: &str, identifier: &str) -> bool {
        self.throttle.requires_captcha(client_ip, identifier)
    }

    /// Log in with email-or-username plus password.
    ///
    /// After three failures within the window, the pair must present a
    /// captcha token. A success clears the pair's failure history. Unknown
    /// identifiers and federated accounts without a password burn the same
    /// key-derivation time as a wrong password.
    pub async fn login(
        &self,
        request: LoginRequest,
        client_ip: &str,
    ) -> AuthResult<(PublicUser, SessionTokens)> {
        let identifier = request.identifier.trim();
        if identifier.is_empty() || request.password.is_empty() {
            return Err(AuthError::Validation(
                "Identifier and password are required".to_string(),
            ));
        }

        if self.throttle.requires_captcha(client_ip, identifier) {
            match &request.captcha_token {
                None => return Err(AuthError::CaptchaRequired),
                Some(token) => self.captcha.verify(token, client_ip).await?,
            }
        }

        let user = match self.find_by_identifier(identifier).await? {
            Some(user) => user,
            None => {
                password::dummy_verify(&request.password);
                return Err(self.record_failure(client_ip, identifier));
            }
        };

        let Some(hash) = user.password_hash.as_deref() else {
            // Federated account with no local password.
            password::dummy_verify(&request.password);
            return Err(self.record_failure(client_ip, identifier));
        };

        if password::verify(&request.password, hash).is_err() {
            return Err(self.record_failure(client_ip, identifier));
        }

        self.throttle.clear(client_ip, identifier);
        tracing::info!(user_id = user.id, "login succeeded");
        let session = self.tokens.issue_session(&user)?;
        Ok((PublicUser::from(&user), session))
    }

    fn record_failure(&self, client_ip: &str, identifier: &str) -> AuthError {
        let count = self.throttle.record(client_ip, identifier);
        tracing::warn!(client_ip, identifier, count, "login failed");
        AuthError::InvalidCredentials
    }

    async fn find_by_identifier(&self, identifier: &str) -> AuthResult<Option<User>> {
        // Emails are stored lowercased, so case-fold email-shaped
        // identifiers before the lookup.
        if identifier.contains('@') {
            if let Some(user) = self
                .users
                .find_by_email(&identifier.to_ascii_lowercase())
                .await?
            {
                return Ok(Some(user));
            }
        }
        self.users.find_by_username(identifier).await
    }

    // ===== Google OAuth =====

    /// Log in (or sign up) with a Google authorization code.
    ///
    /// First sight of an email provisions an account with no local
    /// password; the username is derived from the email's local part,
    /// suffixed until unique.
    pub async fn login_with_google(&self, code: &str) -> AuthResult<(PublicUser, SessionTokens)> {
        let oauth = self
            .google
            .as_ref()
            .ok_or_else(|| AuthError::Upstream("Google sign-in is not configured".to_string()))?;

        let profile = oauth.exchange_code(code).await?;
        let email = profile
            .email
            .ok_or_else(|| AuthError::Upstream("Google account has no email".to_string()))?;
        let email = normalize_email(&email)?;

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let username = self.unique_username_from(&email).await?;
                let user = self
                    .users
                    .create(NewUser {
                        email: email.clone(),
                        username,
                        password_hash: None,
                        role: DEFAULT_ROLE.to_string(),
                    })
                    .await?;
                tracing::info!(user_id = user.id, "account provisioned via Google");
                user
            }
        };

        let session = self.tokens.issue_session(&user)?;
        Ok((PublicUser::from(&user), session))
    }

    async fn unique_username_from(&self, email: &str) -> AuthResult<String> {
        let base: String = email
            .split('@')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let base = if base.len() >= 3 { base } else { format!("user{base}") };

        if self.users.find_by_username(&base).await?.is_none() {
            return Ok(base);
        }
        loop {
            let suffix: u32 = rand::Rng::random_range(&mut rand::rng(), 0..10_000u32);
            let candidate = format!("{base}{suffix:04}");
            if self.users.find_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
    }

    // ===== One-time codes =====

    /// Issue and email a code for the given purpose.
    ///
    /// Reset-password codes require an existing account; registration codes
    /// do not (the account does not exist yet by definition).
    pub async fn request_otp(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        let email = normalize_email(email)?;

        if purpose == OtpPurpose::ResetPassword
            && self.users.find_by_email(&email).await?.is_none()
        {
            return Err(AuthError::UserNotFound);
        }

        let code = self.otp.issue(&email, purpose).await?;
        self.dispatcher.dispatch(&email, purpose, &code).await
    }

    /// Verify a submitted code for the given purpose
    pub async fn verify_otp(&self, email: &str, purpose: OtpPurpose, code: &str) -> AuthResult<()> {
        let email = normalize_email(email)?;
        self.otp.verify(&email, purpose, code).await
    }

    // ===== Password reset =====

    /// Set a new password after a reset code has been verified.
    ///
    /// The verified code is consumed here, not at verification, so an
    /// interrupted reset can be retried without requesting a new code.
    pub async fn reset_password(&self, email: &str, new_password: &str) -> AuthResult<()> {
        let email = normalize_email(email)?;
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        password::validate_strength(new_password)?;
        let password_hash = password::hash(new_password)?;

        if !self.otp.take_verified(&email, OtpPurpose::ResetPassword).await? {
            return Err(AuthError::OtpNotVerified);
        }

        self.users.update_password(user.id, &password_hash).await?;
        tracing::info!(user_id = user.id, "password reset");
        Ok(())
    }

    // ===== Sessions =====

    /// Exchange a refresh token for a fresh access/refresh pair.
    ///
    /// The returned refresh token replaces the presented one; both classes
    /// rotate on every use.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(PublicUser, SessionTokens)> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let session = self.tokens.issue_session(&user)?;
        Ok((PublicUser::from(&user), session))
    }

    /// Verify an access token and return its claims
    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        self.tokens.verify(token, TokenKind::Access)
    }

    // ===== Profile =====

    /// Fetch the public projection of an account
    pub async fn current_user(&self, id: UserId) -> AuthResult<PublicUser> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    /// Change the account's username
    pub async fn update_profile(&self, id: UserId, username: &str) -> AuthResult<PublicUser> {
        let username = validate_username(username)?;

        if let Some(existing) = self.users.find_by_username(&username).await? {
            if existing.id != id {
                return Err(AuthError::UsernameTaken);
            }
        }

        let user = self
            .users
            .update_username(id, &username)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    // ===== Maintenance =====

    /// Drop stale pending registrations, aged-out failure records, and
    /// expired one-time codes; meant to run on a timer
    pub async fn sweep_pending(&self) -> usize {
        self.throttle.collect_garbage();
        match self.otp.purge_expired().await {
            Ok(purged) if purged > 0 => {
                tracing::debug!(purged, "purged expired one-time codes");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "one-time code purge failed"),
        }
        self.pending.sweep()
    }
}

fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(email)
    } else {
        Err(AuthError::Validation("A valid email is required".to_string()))
    }
}

fn validate_username(username: &str) -> AuthResult<String> {
    let username = username.trim().to_string();
    let valid = (3..=30).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(username)
    } else {
        Err(AuthError::Validation(
            "Username must be 3-30 characters of letters, numbers, or underscores".to_string(),
        ))
    }
}
