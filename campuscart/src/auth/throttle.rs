//! Failed-login bookkeeping and captcha escalation.
//!
//! Failures are counted per (client IP, identifier) inside a sliding
//! window. Once the count reaches the threshold, further login attempts
//! from that pair must carry a captcha token. A successful login clears
//! the pair's history.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding window over which failures are counted
pub const FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Failures within the window after which a captcha becomes mandatory
pub const CAPTCHA_THRESHOLD: usize = 3;

/// Tracks recent login failures per (client IP, identifier)
pub struct FailedAttempts {
    attempts: Mutex<HashMap<(String, String), Vec<Instant>>>,
    window: Duration,
}

impl Default for FailedAttempts {
    fn default() -> Self {
        Self::new()
    }
}

impl FailedAttempts {
    pub fn new() -> Self {
        Self::with_window(FAILURE_WINDOW)
    }

    /// Test hook: shorten the sliding window
    pub fn with_window(window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record a failed attempt and return the pair's count within the
    /// current window
    pub fn record(&self, client_ip: &str, identifier: &str) -> usize {
        let mut attempts = self.attempts.lock().expect("attempt map lock poisoned");
        let entry = attempts
            .entry((client_ip.to_string(), identifier.to_string()))
            .or_default();
        Self::prune(entry, self.window);
        entry.push(Instant::now());
        entry.len()
    }

    /// Current failure count for a pair. A record whose every failure has
    /// aged out is removed entirely rather than lingering as an empty
    /// entry until the next sweep.
    pub fn count(&self, client_ip: &str, identifier: &str) -> usize {
        let mut attempts = self.attempts.lock().expect("attempt map lock poisoned");
        let key = (client_ip.to_string(), identifier.to_string());
        let remaining = match attempts.get_mut(&key) {
            Some(entry) => {
                Self::prune(entry, self.window);
                entry.len()
            }
            None => return 0,
        };
        if remaining == 0 {
            attempts.remove(&key);
        }
        remaining
    }

    /// Whether further attempts from this pair must carry a captcha token
    pub fn requires_captcha(&self, client_ip: &str, identifier: &str) -> bool {
        self.count(client_ip, identifier) >= CAPTCHA_THRESHOLD
    }

    /// Forget the pair's history (called on successful login)
    pub fn clear(&self, client_ip: &str, identifier: &str) {
        self.attempts
            .lock()
            .expect("attempt map lock poisoned")
            .remove(&(client_ip.to_string(), identifier.to_string()));
    }

    /// Drop pairs whose every failure has aged out of the window
    pub fn collect_garbage(&self) -> usize {
        let mut attempts = self.attempts.lock().expect("attempt map lock poisoned");
        let before = attempts.len();
        attempts.retain(|_, entry| {
            Self::prune(entry, self.window);
            !entry.is_empty()
        });
        before - attempts.len()
    }

    fn prune(entry: &mut Vec<Instant>, window: Duration) {
        entry.retain(|at| at.elapsed() <= window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_kicks_in_at_threshold() {
        let throttle = FailedAttempts::new();
        for n in 1..CAPTCHA_THRESHOLD {
            throttle.record("1.2.3.4", "alice");
            assert!(!throttle.requires_captcha("1.2.3.4", "alice"), "at {n}");
        }
        throttle.record("1.2.3.4", "alice");
        assert!(throttle.requires_captcha("1.2.3.4", "alice"));
    }

    #[test]
    fn pairs_are_independent() {
        let throttle = FailedAttempts::new();
        for _ in 0..CAPTCHA_THRESHOLD {
            throttle.record("1.2.3.4", "alice");
        }
        assert!(!throttle.requires_captcha("1.2.3.4", "bob"));
        assert!(!throttle.requires_captcha("5.6.7.8", "alice"));
    }

    #[test]
    fn success_clears_history() {
        let throttle = FailedAttempts::new();
        for _ in 0..CAPTCHA_THRESHOLD {
            throttle.record("1.2.3.4", "alice");
        }
        throttle.clear("1.2.3.4", "alice");
        assert_eq!(throttle.count("1.2.3.4", "alice"), 0);
        assert!(!throttle.requires_captcha("1.2.3.4", "alice"));
    }

    #[test]
    fn failures_age_out_of_the_window() {
        let throttle = FailedAttempts::with_window(Duration::from_millis(20));
        for _ in 0..CAPTCHA_THRESHOLD {
            throttle.record("1.2.3.4", "alice");
        }
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(throttle.collect_garbage(), 1);
    }

    #[test]
    fn reading_a_fully_aged_pair_removes_its_record() {
        let throttle = FailedAttempts::with_window(Duration::from_millis(20));
        throttle.record("1.2.3.4", "alice");
        std::thread::sleep(Duration::from_millis(40));

        assert!(!throttle.requires_captcha("1.2.3.4", "alice"));
        // The read dropped the emptied record, so the sweep finds nothing.
        assert_eq!(throttle.collect_garbage(), 0);
    }
}
