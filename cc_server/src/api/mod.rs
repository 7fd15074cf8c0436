//! HTTP API for the CampusCart authentication server.
//!
//! # Architecture
//!
//! - **Axum**: async web framework
//! - **Tower**: CORS and middleware layers
//! - **JWT**: access tokens in headers, refresh tokens in HttpOnly cookies
//!
//! # Modules
//!
//! - [`auth`]: handlers for registration, login, OAuth, OTP, reset, refresh
//! - [`middleware`]: access-token validation for protected endpoints
//! - [`rate_limiter`]: per-key sliding-window throttles
//! - [`request_id`]: request id generation and propagation
//! - [`error`]: [`AuthError`](campuscart::AuthError)-to-HTTP mapping
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                          - Health check (public)
//! POST /api/auth/register-pending       - Stage registration, email code (public)
//! POST /api/auth/register               - Complete registration with code (public)
//! POST /api/auth/login                  - Login (public)
//! POST /api/auth/google                 - Google OAuth sign-in (public)
//! POST /api/auth/otp/request            - Request a one-time code (public)
//! POST /api/auth/otp/verify             - Verify a one-time code (public)
//! POST /api/auth/reset-password         - Reset password after verification (public)
//! POST /api/auth/refresh                - Rotate the session via refresh cookie (public)
//! POST /api/auth/logout                 - Clear the refresh cookie (public)
//! GET  /api/auth/user                   - Current profile (auth required)
//! PUT  /api/auth/profile                - Update username (auth required)
//! ```
//!
//! # Security
//!
//! - Access tokens expire after 15 minutes, refresh tokens after 7 days
//! - Refresh tokens rotate on every use and never leave the cookie
//! - Login failures escalate to mandatory captcha after 3 within an hour
//! - Rate limits on login, registration, OTP issuance, and password reset
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use campuscart::AuthManager;
use rate_limiter::RateLimiters;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The authentication manager driving every account flow
    pub auth: Arc<AuthManager>,
    /// Per-endpoint rate limiters
    pub limiters: Arc<RateLimiters>,
    /// Database pool for the health check; `None` when running on the
    /// in-memory repositories
    pub pool: Option<Arc<PgPool>>,
    /// Whether refresh cookies carry the `Secure` attribute
    pub cookie_secure: bool,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register-pending", post(auth::register_pending))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/google", post(auth::google))
        .route("/otp/request", post(auth::request_otp))
        .route("/otp/verify", post(auth::verify_otp))
        .route("/reset-password", post(auth::reset_password))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/user", get(auth::current_user))
        .route("/profile", put(auth::update_profile))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", public_routes.merge(protected_routes))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database (if configured) answers a trivial
/// query, `503 Service Unavailable` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.pool {
        Some(pool) => sqlx::query("SELECT 1").fetch_one(&**pool).await.is_ok(),
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
