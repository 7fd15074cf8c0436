//! Holding area for registrations awaiting email verification.
//!
//! An account row is only created after the applicant proves control of the
//! email address, so the submitted details (with the password already
//! hashed) are parked here under a random opaque id. Entries that are never
//! completed go stale and are swept by a background task.

use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::models::PendingRegistration;

/// How long a staged registration stays claimable
pub const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// How often the background sweep runs
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Thread-safe store of staged registrations keyed by opaque id
pub struct PendingRegistrations {
    entries: Mutex<HashMap<String, PendingRegistration>>,
    ttl: Duration,
}

impl Default for PendingRegistrations {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRegistrations {
    pub fn new() -> Self {
        Self::with_ttl(STALE_AFTER)
    }

    /// Test hook: shorten the staleness window
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Park a registration and return its opaque id (256 bits of
    /// CSPRNG output, hex-encoded)
    pub fn stage(&self, registration: PendingRegistration) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let id = hex::encode(bytes);

        self.entries
            .lock()
            .expect("pending map lock poisoned")
            .insert(id.clone(), registration);
        id
    }

    /// Remove and return the entry for an id, unless it has gone stale.
    /// Stale entries are dropped on contact rather than waiting for the
    /// sweep.
    pub fn take(&self, id: &str) -> Option<PendingRegistration> {
        let mut entries = self.entries.lock().expect("pending map lock poisoned");
        let entry = entries.remove(id)?;
        if entry.staged_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry)
    }

    /// Peek at the staged email for an id without consuming the entry
    pub fn email_for(&self, id: &str) -> Option<String> {
        let entries = self.entries.lock().expect("pending map lock poisoned");
        entries.get(id).and_then(|entry| {
            (entry.staged_at.elapsed() <= self.ttl).then(|| entry.email.clone())
        })
    }

    /// Drop entries older than the staleness window, returning how many
    /// were removed
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().expect("pending map lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.staged_at.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "swept stale pending registrations");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("pending map lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn entry(email: &str) -> PendingRegistration {
        PendingRegistration {
            email: email.to_string(),
            username: "alice".to_string(),
            password_hash: "hash".to_string(),
            staged_at: Instant::now(),
        }
    }

    #[test]
    fn stage_and_take_roundtrip() {
        let pending = PendingRegistrations::new();
        let id = pending.stage(entry("a@b.com"));

        assert_eq!(id.len(), 64);
        assert_eq!(pending.email_for(&id).as_deref(), Some("a@b.com"));

        let taken = pending.take(&id).unwrap();
        assert_eq!(taken.email, "a@b.com");
        // Consumed: a second take finds nothing.
        assert!(pending.take(&id).is_none());
    }

    #[test]
    fn ids_are_unpredictable_and_distinct() {
        let pending = PendingRegistrations::new();
        let a = pending.stage(entry("a@b.com"));
        let b = pending.stage(entry("b@b.com"));
        assert_ne!(a, b);
    }

    #[test]
    fn stale_entries_are_unclaimable() {
        let pending = PendingRegistrations::with_ttl(Duration::ZERO);
        let id = pending.stage(entry("a@b.com"));

        std::thread::sleep(Duration::from_millis(5));
        assert!(pending.email_for(&id).is_none());
        assert!(pending.take(&id).is_none());
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let pending = PendingRegistrations::with_ttl(Duration::from_millis(20));
        pending.stage(entry("old@b.com"));
        std::thread::sleep(Duration::from_millis(40));
        let live = pending.stage(entry("new@b.com"));

        assert_eq!(pending.sweep(), 1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.email_for(&live).as_deref(), Some("new@b.com"));
    }
}
