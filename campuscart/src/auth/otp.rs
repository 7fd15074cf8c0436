//! One-time-code issuance and verification.
//!
//! Codes are 6-digit zero-padded numerics drawn from a CSPRNG, live for a
//! single fixed TTL, and allow at most [`MAX_ATTEMPTS`] wrong guesses.
//! Issuing a new code supersedes any prior one for the same
//! (email, purpose) pair.

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::db::OtpRepository;

use super::errors::{AuthError, AuthResult};
use super::models::{OneTimeCode, OtpPurpose};

/// Single TTL for every code. (One observed variant multiplied minutes by
/// 50 instead of 5; that was a defect, not a second tier.)
pub const OTP_TTL: Duration = Duration::minutes(5);

/// Wrong guesses allowed before the code is destroyed
pub const MAX_ATTEMPTS: i32 = 3;

/// Code length in digits
pub const CODE_LENGTH: usize = 6;

/// Generate a zero-padded numeric code, uniform over the digit space
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

/// Issues and verifies one-time codes over a swappable store
#[derive(Clone)]
pub struct OtpService {
    repo: Arc<dyn OtpRepository>,
}

impl OtpService {
    pub fn new(repo: Arc<dyn OtpRepository>) -> Self {
        Self { repo }
    }

    /// Issue a fresh code for an (email, purpose), superseding any prior
    /// one, and return it for dispatch
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> AuthResult<String> {
        let code = generate_code();
        self.repo
            .replace(OneTimeCode {
                email: email.to_string(),
                purpose,
                code: code.clone(),
                expires_at: Utc::now() + OTP_TTL,
                attempts: 0,
                verified: false,
            })
            .await?;

        tracing::debug!(email, purpose = purpose.as_str(), "one-time code issued");
        Ok(code)
    }

    /// Verify a submitted code.
    ///
    /// Expiry and the attempt cap destroy the record; a mismatch burns an
    /// attempt. On a match, `registration` codes are consumed atomically
    /// (one winner under concurrency) while `reset-password` codes are
    /// retained with `verified = true` for the final reset step.
    pub async fn verify(&self, email: &str, purpose: OtpPurpose, submitted: &str) -> AuthResult<()> {
        let record = self
            .repo
            .find(email, purpose)
            .await?
            .ok_or(AuthError::OtpNotFound)?;

        if Utc::now() > record.expires_at {
            self.repo.delete(email, purpose).await?;
            return Err(AuthError::OtpExpired);
        }

        if record.attempts >= MAX_ATTEMPTS {
            self.repo.delete(email, purpose).await?;
            return Err(AuthError::OtpTooManyAttempts);
        }

        if !constant_time_eq(&record.code, submitted) {
            self.repo.increment_attempts(email, purpose).await?;
            return Err(AuthError::OtpInvalid);
        }

        match purpose {
            OtpPurpose::ResetPassword => {
                self.repo.mark_verified(email, purpose).await?;
            }
            OtpPurpose::Registration => {
                // A concurrent verification may have consumed it first.
                if !self.repo.consume_matching(email, purpose, submitted).await? {
                    return Err(AuthError::OtpNotFound);
                }
            }
        }

        Ok(())
    }

    /// Whether a verified reset-password code exists for this email
    pub async fn has_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<bool> {
        Ok(self
            .repo
            .find(email, purpose)
            .await?
            .is_some_and(|record| record.verified))
    }

    /// Consume the verified record once the reset actually happened
    pub async fn take_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<bool> {
        self.repo.take_verified(email, purpose).await
    }

    /// Drop every expired record. Verification already deletes expired
    /// codes it touches; this catches the ones nobody ever submits.
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        self.repo.purge_expired().await
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryOtpRepository;

    fn service() -> (OtpService, Arc<MemoryOtpRepository>) {
        let repo = Arc::new(MemoryOtpRepository::new());
        (OtpService::new(repo.clone()), repo)
    }

    #[test]
    fn generated_codes_are_six_zero_padded_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "bad code {code}");
        }
    }

    #[tokio::test]
    async fn issuing_invalidates_prior_code() {
        let (otp, _) = service();
        let first = otp.issue("a@b.com", OtpPurpose::Registration).await.unwrap();
        let second = otp.issue("a@b.com", OtpPurpose::Registration).await.unwrap();

        if first != second {
            assert!(matches!(
                otp.verify("a@b.com", OtpPurpose::Registration, &first).await,
                Err(AuthError::OtpInvalid)
            ));
        }
        otp.verify("a@b.com", OtpPurpose::Registration, &second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn registration_code_is_single_use() {
        let (otp, _) = service();
        let code = otp.issue("a@b.com", OtpPurpose::Registration).await.unwrap();

        otp.verify("a@b.com", OtpPurpose::Registration, &code).await.unwrap();
        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, &code).await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn reset_code_is_retained_as_verified() {
        let (otp, _) = service();
        let code = otp.issue("a@b.com", OtpPurpose::ResetPassword).await.unwrap();

        otp.verify("a@b.com", OtpPurpose::ResetPassword, &code).await.unwrap();
        assert!(otp.has_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap());

        // Only the final reset consumes it.
        assert!(otp.take_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap());
        assert!(!otp.has_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap());
    }

    #[tokio::test]
    async fn fourth_attempt_is_rejected_even_when_correct() {
        let (otp, _) = service();
        let code = otp.issue("a@b.com", OtpPurpose::Registration).await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(matches!(
                otp.verify("a@b.com", OtpPurpose::Registration, wrong).await,
                Err(AuthError::OtpInvalid)
            ));
        }

        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, &code).await,
            Err(AuthError::OtpTooManyAttempts)
        ));
        // The record was destroyed along the way.
        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, &code).await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_rejected_with_zero_attempts() {
        let (otp, repo) = service();
        repo.insert_raw(OneTimeCode {
            email: "a@b.com".to_string(),
            purpose: OtpPurpose::Registration,
            code: "123456".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
            attempts: 0,
            verified: false,
        });

        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, "123456").await,
            Err(AuthError::OtpExpired)
        ));
        // Expiry deletes the record as a side effect.
        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, "123456").await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn purge_drops_abandoned_expired_codes() {
        let (otp, repo) = service();
        repo.insert_raw(OneTimeCode {
            email: "a@b.com".to_string(),
            purpose: OtpPurpose::Registration,
            code: "123456".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
            attempts: 0,
            verified: false,
        });
        let live = otp.issue("b@b.com", OtpPurpose::Registration).await.unwrap();

        assert_eq!(otp.purge_expired().await.unwrap(), 1);

        // The live code survives the purge.
        otp.verify("b@b.com", OtpPurpose::Registration, &live)
            .await
            .unwrap();
        assert!(matches!(
            otp.verify("a@b.com", OtpPurpose::Registration, "123456").await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_pair_is_not_found() {
        let (otp, _) = service();
        assert!(matches!(
            otp.verify("nobody@b.com", OtpPurpose::Registration, "123456").await,
            Err(AuthError::OtpNotFound)
        ));
    }
}
