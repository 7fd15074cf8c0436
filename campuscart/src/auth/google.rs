//! Google OAuth 2.0 authorization-code exchange.
//!
//! The client sends an authorization code; we exchange it for tokens at
//! Google's token endpoint and then validate the returned `id_token` via
//! the tokeninfo endpoint, taking the email and display name from the
//! validated claims.

use serde::Deserialize;
use std::time::Duration;

use super::errors::{AuthError, AuthResult};
use super::models::GoogleProfile;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth client credentials plus the redirect URI registered with Google
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenInfo {
    email: Option<String>,
    name: Option<String>,
}

/// Exchanges authorization codes for validated Google profiles
pub struct GoogleOAuth {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Exchange an authorization code for the holder's profile
    pub async fn exchange_code(&self, code: &str) -> AuthResult<GoogleProfile> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "token exchange returned {}",
                response.status()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("token response unreadable: {e}")))?;

        let id_token = tokens
            .id_token
            .ok_or_else(|| AuthError::Upstream("token response missing id_token".to_string()))?;

        self.validate_id_token(&id_token).await
    }

    async fn validate_id_token(&self, id_token: &str) -> AuthResult<GoogleProfile> {
        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("tokeninfo failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("tokeninfo response unreadable: {e}")))?;

        Ok(GoogleProfile {
            email: info.email,
            name: info.name,
        })
    }
}
