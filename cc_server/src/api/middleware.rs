//! Authentication middleware for protected endpoints.
//!
//! Validates the `Authorization: Bearer <token>` access token and injects
//! the verified [`Claims`] into request extensions for downstream handlers.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware, extract::Extension};
//! use campuscart::auth::Claims;
//! # use cc_server::api::middleware::auth_middleware;
//! # use cc_server::api::AppState;
//!
//! async fn whoami(Extension(claims): Extension<Claims>) -> String {
//!     claims.username
//! }
//! # let state: AppState = unimplemented!();
//! let protected: Router = Router::new()
//!     .route("/api/auth/user", get(whoami))
//!     .layer(middleware::from_fn_with_state(state, auth_middleware));
//! # let _ = protected;
//! ```

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use super::AppState;

/// Validate the bearer access token and inject its claims
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(t) => t,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match state.auth.verify_access(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}
