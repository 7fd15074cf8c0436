//! HTTP error mapping for the auth API.
//!
//! Every handler error funnels through [`ApiError`], which picks the status
//! code and serializes the client-safe message. Internal detail stays in the
//! logs; the response body carries only `AuthError::client_message()`.

use axum::{
    Json,
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use campuscart::AuthError;
use serde_json::json;

/// Handler-level error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
}

impl ApiError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(err) => match err {
                AuthError::Validation(_)
                | AuthError::WeakPassword(_)
                | AuthError::EmailTaken
                | AuthError::UsernameTaken
                | AuthError::OtpNotFound
                | AuthError::OtpExpired
                | AuthError::OtpTooManyAttempts
                | AuthError::OtpInvalid
                | AuthError::InvalidSession
                | AuthError::CaptchaRequired
                | AuthError::CaptchaFailed => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials
                | AuthError::Unauthenticated
                | AuthError::OtpNotVerified => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::Dispatch(_) | AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
                AuthError::Database(_) | AuthError::HashingFailed => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub(crate) fn message(&self) -> String {
        match self {
            ApiError::Auth(err) => err.client_message(),
            ApiError::RateLimited { .. } => {
                "Too many requests, please try again later".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "message": self.message() }));
        match self {
            ApiError::RateLimited { retry_after_secs } => {
                (status, [(RETRY_AFTER, retry_after_secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_by_class() {
        assert_eq!(
            ApiError::Auth(AuthError::EmailTaken).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Auth(AuthError::UserNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Auth(AuthError::Dispatch("smtp down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 30 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = ApiError::Auth(AuthError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.message(), "Internal server error");
    }
}
