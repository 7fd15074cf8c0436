//! Structured logging configuration.
//!
//! Console output with targets and source locations, filtered via
//! `RUST_LOG` (defaulting to `info` with chatty dependencies demoted).

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a security-relevant event with structured fields.
///
/// Aimed at the audit trail: failed logins, captcha escalations, refresh
/// token rejections.
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_event_does_not_panic() {
        log_security_event("failed_login", Some(1), Some("127.0.0.1"), "Bad password");
        log_security_event("refresh_rejected", None, None, "Expired cookie");
    }
}
