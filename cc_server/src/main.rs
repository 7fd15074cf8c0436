//! CampusCart authentication server binary.
//!
//! Wires the PostgreSQL-backed auth manager into the HTTP router, starts
//! the background sweep for stale pending registrations, and serves until
//! interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use campuscart::auth::{
    AuthManager, GoogleOAuth, HttpMailer, RecaptchaVerifier, TokenIssuer, pending::SWEEP_INTERVAL,
};
use campuscart::db::{Database, PgOtpRepository, PgUserRepository};
use cc_server::{api, config::ServerConfig, logging, metrics};
use pico_args::Arguments;

const HELP: &str = "\
Run the CampusCart authentication server

USAGE:
  cc_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:3000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:3000)
  DATABASE_URL             PostgreSQL connection string
  ACCESS_TOKEN_SECRET      Access token signing secret (required)
  REFRESH_TOKEN_SECRET     Refresh token signing secret (required, distinct)
  RECAPTCHA_SECRET_KEY     reCAPTCHA server-side secret (required)
  MAIL_API_URL             Transactional mail relay endpoint (required)
  MAIL_API_KEY             Mail relay API key (required)
  MAIL_SENDER              From address for outgoing mail (required)
  GOOGLE_CLIENT_ID         Google OAuth client id (optional, with the two below)
  GOOGLE_CLIENT_SECRET     Google OAuth client secret
  GOOGLE_REDIRECT_URI      Google OAuth redirect URI
  METRICS_BIND             Prometheus exporter address (optional)
  APP_ENV                  'production' marks refresh cookies Secure
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, database_url_override)?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        tracing::info!(%metrics_bind, "Prometheus exporter listening");
    }

    tracing::info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    let pool = Arc::new(db.pool().clone());
    tracing::info!("Database connected successfully");

    let google = config.google.clone().map(GoogleOAuth::new);
    if google.is_none() {
        tracing::warn!("Google OAuth not configured; /api/auth/google is disabled");
    }

    let auth = Arc::new(AuthManager::new(
        Arc::new(PgUserRepository::new(db.pool().clone())),
        Arc::new(PgOtpRepository::new(db.pool().clone())),
        TokenIssuer::new(
            config.security.access_token_secret.clone(),
            config.security.refresh_token_secret.clone(),
        ),
        Arc::new(RecaptchaVerifier::new(config.security.recaptcha_secret.clone())),
        Arc::new(HttpMailer::new(config.mail.clone())),
        google,
    ));

    // Periodically drop staged registrations nobody completed and
    // expired one-time codes nobody submitted.
    let sweeper = {
        let auth = auth.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let removed = auth.sweep_pending().await;
                if removed > 0 {
                    tracing::info!(removed, "swept stale pending registrations");
                }
            }
        })
    };

    let state = api::AppState {
        auth,
        limiters: Arc::new(api::rate_limiter::RateLimiters::new()),
        pool: Some(pool),
        cookie_secure: config.cookie_secure,
    };

    let app = api::create_router(state);

    tracing::info!(bind = %config.bind, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    sweeper.abort();
    db.close().await;
    tracing::info!("Server shut down");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
