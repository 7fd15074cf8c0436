//! Per-key rate limiting for the authentication endpoints.
//!
//! Sliding-window limiter keyed by strings such as `ip:identifier` or a
//! bare email, with one limiter per endpoint family. This is coarse
//! request throttling; the captcha escalation on repeated login failures
//! lives in the auth manager.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter shared across requests
#[derive(Debug)]
pub struct KeyedRateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl KeyedRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Record a request under `key`. `Ok` admits it; `Err` carries the
    /// seconds until the oldest recorded request ages out.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let timestamps = windows.entry(key.to_string()).or_default();

        while let Some(ts) = timestamps.front() {
            if now.duration_since(*ts) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after.as_secs().max(1));
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Drop keys whose every timestamp has aged out
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let before = windows.len();
        windows.retain(|_, timestamps| {
            timestamps.iter().any(|ts| now.duration_since(*ts) <= self.window)
        });
        before - windows.len()
    }
}

/// One limiter per endpoint family, each with its own budget
#[derive(Debug)]
pub struct RateLimiters {
    /// Login attempts per (client IP, identifier)
    pub login: KeyedRateLimiter,
    /// Registration attempts per client IP
    pub registration: KeyedRateLimiter,
    /// Code requests per email; effectively a resend cooldown
    pub otp_request: KeyedRateLimiter,
    /// Reset attempts per email
    pub password_reset: KeyedRateLimiter,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            login: KeyedRateLimiter::new(5, Duration::from_secs(15 * 60)),
            registration: KeyedRateLimiter::new(3, Duration::from_secs(60 * 60)),
            otp_request: KeyedRateLimiter::new(1, Duration::from_secs(45)),
            password_reset: KeyedRateLimiter::new(3, Duration::from_secs(60 * 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn allows_within_limit() {
        let limiter = KeyedRateLimiter::new(3, Duration::from_secs(1));
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4:alice").is_ok());
        }
    }

    #[test]
    fn blocks_over_limit_with_retry_hint() {
        let limiter = KeyedRateLimiter::new(2, Duration::from_secs(30));
        limiter.check("key").unwrap();
        limiter.check("key").unwrap();

        let retry_after = limiter.check("key").unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 30);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = KeyedRateLimiter::new(1, Duration::from_secs(30));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = KeyedRateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("key").is_ok());
        assert!(limiter.check("key").is_err());

        thread::sleep(Duration::from_millis(80));
        assert!(limiter.check("key").is_ok());
    }

    #[test]
    fn garbage_collection_drops_idle_keys() {
        let limiter = KeyedRateLimiter::new(1, Duration::from_millis(50));
        limiter.check("key").unwrap();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(limiter.collect_garbage(), 1);
    }

    #[test]
    fn default_budgets() {
        let limiters = RateLimiters::new();
        // The OTP limiter is a strict resend cooldown.
        assert!(limiters.otp_request.check("a@b.com").is_ok());
        assert!(limiters.otp_request.check("a@b.com").is_err());
    }
}
