//! One-time-code delivery over an HTTP mail relay.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::errors::{AuthError, AuthResult};
use super::models::OtpPurpose;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers one-time codes to an email address.
///
/// Behind a trait so tests can capture the code instead of sending mail.
#[async_trait]
pub trait CodeDispatcher: Send + Sync {
    async fn dispatch(&self, email: &str, purpose: OtpPurpose, code: &str) -> AuthResult<()>;
}

/// Relay API configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Relay endpoint accepting a JSON send request
    pub api_url: String,
    /// Bearer token for the relay
    pub api_key: String,
    /// From address on outgoing mail
    pub sender: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Production dispatcher posting to a transactional-mail relay API
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailerConfig,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn subject(purpose: OtpPurpose) -> &'static str {
        match purpose {
            OtpPurpose::Registration => "Your verification code",
            OtpPurpose::ResetPassword => "Your password reset code",
        }
    }

    fn body(purpose: OtpPurpose, code: &str) -> String {
        match purpose {
            OtpPurpose::Registration => format!(
                "Your verification code is {code}. It expires in 5 minutes.\n\n\
                 If you did not request this, you can ignore this email."
            ),
            OtpPurpose::ResetPassword => format!(
                "Your password reset code is {code}. It expires in 5 minutes.\n\n\
                 If you did not request a password reset, you can ignore this email."
            ),
        }
    }
}

#[async_trait]
impl CodeDispatcher for HttpMailer {
    async fn dispatch(&self, email: &str, purpose: OtpPurpose, code: &str) -> AuthResult<()> {
        let request = SendRequest {
            from: &self.config.sender,
            to: email,
            subject: Self::subject(purpose),
            text: &Self::body(purpose, code),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Dispatch(format!(
                "mail relay returned {}",
                response.status()
            )));
        }

        tracing::debug!(email, purpose = purpose.as_str(), "one-time code dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_the_code() {
        let body = HttpMailer::body(OtpPurpose::Registration, "042137");
        assert!(body.contains("042137"));
        assert!(body.contains("5 minutes"));
    }

    #[test]
    fn subjects_differ_by_purpose() {
        assert_ne!(
            HttpMailer::subject(OtpPurpose::Registration),
            HttpMailer::subject(OtpPurpose::ResetPassword)
        );
    }
}
