//! Captcha verification against Google reCAPTCHA.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::errors::{AuthError, AuthResult};

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies a client-supplied captcha token.
///
/// Behind a trait so tests can stub the verdict without network access.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Ok(()) when the token is valid, [`AuthError::CaptchaFailed`]
    /// otherwise. Verification failures fail closed.
    async fn verify(&self, token: &str, client_ip: &str) -> AuthResult<()>;
}

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Production verifier backed by the reCAPTCHA siteverify endpoint
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(secret: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, secret }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, client_ip: &str) -> AuthResult<()> {
        let response = self
            .client
            .post(SITEVERIFY_URL)
            .form(&[
                ("secret", self.secret.as_str()),
                ("response", token),
                ("remoteip", client_ip),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "captcha verification request failed");
                AuthError::CaptchaFailed
            })?;

        let verdict: SiteverifyResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "captcha verification response unreadable");
            AuthError::CaptchaFailed
        })?;

        if verdict.success {
            Ok(())
        } else {
            tracing::info!(errors = ?verdict.error_codes, "captcha token rejected");
            Err(AuthError::CaptchaFailed)
        }
    }
}
