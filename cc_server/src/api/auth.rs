//! Authentication API handlers.
//!
//! REST endpoints for the full account lifecycle:
//! - Two-step registration gated by an emailed one-time code
//! - Login with captcha escalation after repeated failures
//! - Google OAuth sign-in
//! - One-time code request/verify and password reset
//! - Token refresh (rotating), logout, and profile read/update
//!
//! Access tokens travel in JSON bodies and the `Authorization` header.
//! Refresh tokens never appear in a body: they live in an `HttpOnly`
//! cookie scoped `SameSite=Strict`, so scripts cannot read them.
//!
//! # Examples
//!
//! Stage a registration:
//! ```bash
//! curl -X POST http://localhost:3000/api/auth/register-pending \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "student@example.com", "username": "student1", "password": "Pass123!", "captcha_token": "..."}'
//! ```
//!
//! Complete it with the emailed code:
//! ```bash
//! curl -X POST http://localhost:3000/api/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"registration_id": "3f2a...", "code": "042137"}'
//! ```

use axum::{
    Json,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use campuscart::AuthError;
use campuscart::auth::{
    Claims, LoginRequest, OtpPurpose, PublicUser, RegisterRequest, SessionTokens,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::metrics;

/// Cookie carrying the refresh token
const REFRESH_COOKIE: &str = "refreshToken";

/// Cookie lifetime, matching the refresh token TTL (7 days)
const REFRESH_COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

// ===== Payloads =====

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub username: String,
    pub password: String,
    pub captcha_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRegistrationPayload {
    pub registration_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    /// Email or username
    pub identifier: String,
    pub password: String,
    pub captcha_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GooglePayload {
    /// OAuth authorization code from the client-side consent flow
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequestPayload {
    pub email: String,
    #[serde(default)]
    pub purpose: OtpPurpose,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyPayload {
    pub email: String,
    #[serde(default)]
    pub purpose: OtpPurpose,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordPayload {
    pub email: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfilePayload {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub user: PublicUser,
    pub access_token: String,
}

// ===== Cookie plumbing =====

fn refresh_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={REFRESH_COOKIE_MAX_AGE_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_refresh_cookie(secure: bool) -> String {
    let mut cookie =
        format!("{REFRESH_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == REFRESH_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// Session response with the refresh token set as a cookie
fn session_response(
    message: &str,
    user: PublicUser,
    tokens: SessionTokens,
    secure: bool,
) -> Response {
    (
        [(
            header::SET_COOKIE,
            refresh_cookie(&tokens.refresh_token, secure),
        )],
        Json(SessionResponse {
            message: message.to_string(),
            user,
            access_token: tokens.access_token,
        }),
    )
        .into_response()
}

/// Client IP for throttling keys: first hop of `x-forwarded-for`, or a
/// fixed marker when the server fronts no proxy
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

// ===== Registration =====

/// Stage a registration and email a verification code.
///
/// No account exists yet: the hashed draft is parked server-side under the
/// returned `registration_id` until the code is confirmed.
///
/// # Errors
///
/// - `400 Bad Request`: captcha failed, email/username taken, weak password
/// - `429 Too Many Requests`: more than 3 registrations per hour per IP
/// - `502 Bad Gateway`: the verification email could not be sent
pub async fn register_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterPayload>,
) -> ApiResult<impl IntoResponse> {
    let ip = client_ip(&headers);
    state
        .limiters
        .registration
        .check(&ip)
        .map_err(|retry_after_secs| {
            metrics::rate_limit_hits_total("registration");
            ApiError::RateLimited { retry_after_secs }
        })?;

    let staged = state
        .auth
        .register_pending(
            RegisterRequest {
                email: payload.email,
                username: payload.username,
                password: payload.password,
                captcha_token: payload.captcha_token,
            },
            &ip,
        )
        .await?;

    metrics::otp_issued_total("registration");
    Ok(Json(json!({
        "message": "Verification code sent to your email",
        "registration_id": staged.registration_id,
        "email": staged.email,
    })))
}

/// Complete a staged registration with the emailed code.
///
/// On success the account is created and a session is opened immediately:
/// the access token is in the body, the refresh token in the cookie.
///
/// # Errors
///
/// - `400 Bad Request`: wrong/expired code, or unknown/stale `registration_id`
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CompleteRegistrationPayload>,
) -> ApiResult<Response> {
    let (user, tokens) = state
        .auth
        .complete_registration(&payload.registration_id, &payload.code)
        .await?;

    metrics::registrations_total();
    Ok(session_response(
        "Registration successful",
        user,
        tokens,
        state.cookie_secure,
    ))
}

// ===== Login =====

/// Log in with email-or-username plus password.
///
/// After three failures within an hour from the same (IP, identifier), a
/// captcha token becomes mandatory; failure responses carry
/// `requires_captcha` so clients know when to render the widget.
///
/// # Errors
///
/// - `400 Bad Request`: captcha required but missing, or captcha rejected
/// - `401 Unauthorized`: bad credentials
/// - `429 Too Many Requests`: more than 5 attempts per 15 minutes
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Response, Response> {
    let ip = client_ip(&headers);
    // Trim once so the limiter key, the credential check, and the captcha
    // flag all see the same identifier.
    let identifier = payload.identifier.trim().to_string();

    state
        .limiters
        .login
        .check(&format!("{ip}:{identifier}"))
        .map_err(|retry_after_secs| {
            metrics::rate_limit_hits_total("login");
            ApiError::RateLimited { retry_after_secs }.into_response()
        })?;

    let result = state
        .auth
        .login(
            LoginRequest {
                identifier: identifier.clone(),
                password: payload.password,
                captcha_token: payload.captcha_token,
            },
            &ip,
        )
        .await;

    match result {
        Ok((user, tokens)) => {
            metrics::login_attempts_total(true);
            Ok(session_response(
                "Login successful",
                user,
                tokens,
                state.cookie_secure,
            ))
        }
        Err(err) => {
            metrics::login_attempts_total(false);
            // Failure responses tell the client whether the next attempt
            // must include a captcha token.
            let requires_captcha = state.auth.requires_captcha(&ip, &identifier);
            Err(login_failure_response(err, requires_captcha))
        }
    }
}

fn login_failure_response(error: AuthError, requires_captcha: bool) -> Response {
    let error = ApiError::Auth(error);
    (
        error.status(),
        Json(json!({
            "message": error.message(),
            "requires_captcha": requires_captcha,
        })),
    )
        .into_response()
}

/// Sign in (or up) with a Google OAuth authorization code.
///
/// # Errors
///
/// - `502 Bad Gateway`: Google rejected the code or was unreachable
pub async fn google(
    State(state): State<AppState>,
    Json(payload): Json<GooglePayload>,
) -> ApiResult<Response> {
    let (user, tokens) = state.auth.login_with_google(&payload.code).await?;

    metrics::login_attempts_total(true);
    Ok(session_response(
        "Login successful",
        user,
        tokens,
        state.cookie_secure,
    ))
}

// ===== One-time codes =====

/// Request a one-time code by email.
///
/// Registration codes are issued for any address; reset-password codes
/// require an existing account.
///
/// # Errors
///
/// - `404 Not Found`: reset requested for an unknown email
/// - `429 Too Many Requests`: resend cooldown (one request per 45 seconds)
/// - `502 Bad Gateway`: the email could not be sent
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequestPayload>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_ascii_lowercase();
    state
        .limiters
        .otp_request
        .check(&email)
        .map_err(|retry_after_secs| {
            metrics::rate_limit_hits_total("otp_request");
            ApiError::RateLimited { retry_after_secs }
        })?;

    state.auth.request_otp(&email, payload.purpose).await?;

    metrics::otp_issued_total(payload.purpose.as_str());
    Ok(Json(json!({ "message": "OTP sent successfully" })))
}

/// Verify a one-time code.
///
/// # Errors
///
/// - `400 Bad Request`: wrong code, expired code, or attempts exhausted
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpVerifyPayload>,
) -> ApiResult<impl IntoResponse> {
    state
        .auth
        .verify_otp(&payload.email, payload.purpose, &payload.code)
        .await?;

    Ok(Json(json!({
        "message": "OTP verified successfully",
        "verified": true,
        "purpose": payload.purpose,
    })))
}

// ===== Password reset =====

/// Set a new password after the reset code was verified.
///
/// # Errors
///
/// - `400 Bad Request`: weak password
/// - `401 Unauthorized`: no verified reset code on file
/// - `404 Not Found`: unknown email
/// - `429 Too Many Requests`: more than 3 resets per hour per email
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> ApiResult<impl IntoResponse> {
    let email = payload.email.trim().to_ascii_lowercase();
    state
        .limiters
        .password_reset
        .check(&email)
        .map_err(|retry_after_secs| {
            metrics::rate_limit_hits_total("password_reset");
            ApiError::RateLimited { retry_after_secs }
        })?;

    state.auth.reset_password(&email, &payload.new_password).await?;

    metrics::password_resets_total();
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

// ===== Sessions =====

/// Exchange the refresh cookie for a fresh session.
///
/// Both tokens rotate: the response body carries a new access token and the
/// cookie is replaced with a new refresh token.
///
/// # Errors
///
/// - `403 Forbidden`: no refresh cookie present
/// - `401 Unauthorized`: cookie invalid or expired; the cookie is cleared
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = extract_refresh_cookie(&headers) else {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Refresh token missing" })),
        )
            .into_response();
    };

    match state.auth.refresh(&token).await {
        Ok((user, tokens)) => session_response(
            "Token refreshed",
            user,
            tokens,
            state.cookie_secure,
        ),
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            [(
                header::SET_COOKIE,
                clear_refresh_cookie(state.cookie_secure),
            )],
            Json(json!({ "message": "Invalid or expired refresh token" })),
        )
            .into_response(),
    }
}

/// Log out by clearing the refresh cookie.
///
/// Outstanding access tokens keep working until they expire (at most 15
/// minutes); only the refresh path is cut.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            clear_refresh_cookie(state.cookie_secure),
        )],
        Json(json!({ "message": "Logged out successfully" })),
    )
}

// ===== Profile =====

/// Return the authenticated account's public profile.
pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user = state.auth.current_user(claims.sub).await?;
    Ok(Json(json!({ "user": user })))
}

/// Change the authenticated account's username.
///
/// # Errors
///
/// - `400 Bad Request`: malformed or taken username
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfilePayload>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .auth
        .update_profile(claims.sub, &payload.username)
        .await?;
    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": user,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = refresh_cookie("tok", false);
        assert!(cookie.starts_with("refreshToken=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        let secure = refresh_cookie("tok", true);
        assert!(secure.ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(false);
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.starts_with("refreshToken=;"));
    }

    #[test]
    fn cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refreshToken=abc123; lang=en"),
        );
        assert_eq!(extract_refresh_cookie(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("refreshToken="));
        assert_eq!(extract_refresh_cookie(&headers), None);

        headers.remove(header::COOKIE);
        assert_eq!(extract_refresh_cookie(&headers), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.9");

        assert_eq!(client_ip(&HeaderMap::new()), "local");
    }
}
