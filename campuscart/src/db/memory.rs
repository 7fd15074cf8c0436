//! In-memory repository implementations.
//!
//! Used by the integration tests and for single-node development without a
//! PostgreSQL instance. Not suitable for multi-process deployments: state
//! lives and dies with the process.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::auth::errors::AuthResult;
use crate::auth::models::{NewUser, OneTimeCode, OtpPurpose, User, UserId};

use super::repository::{OtpRepository, UserRepository};

/// In-memory [`UserRepository`]
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
    next_id: AtomicI64,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let user = User {
            id,
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        self.users
            .lock()
            .expect("user map lock poisoned")
            .insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("user map lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("user map lock poisoned")
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("user map lock poisoned")
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> AuthResult<()> {
        let mut users = self.users.lock().expect("user map lock poisoned");
        if let Some(user) = users.get_mut(&id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_username(&self, id: UserId, username: &str) -> AuthResult<Option<User>> {
        let mut users = self.users.lock().expect("user map lock poisoned");
        Ok(users.get_mut(&id).map(|user| {
            user.username = username.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

/// In-memory [`OtpRepository`]
#[derive(Default)]
pub struct MemoryOtpRepository {
    codes: Mutex<HashMap<(String, OtpPurpose), OneTimeCode>>,
}

impl MemoryOtpRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: insert a record verbatim (e.g. one that is already
    /// expired or partially attempted)
    pub fn insert_raw(&self, record: OneTimeCode) {
        self.codes
            .lock()
            .expect("code map lock poisoned")
            .insert((record.email.clone(), record.purpose), record);
    }
}

#[async_trait]
impl OtpRepository for MemoryOtpRepository {
    async fn replace(&self, record: OneTimeCode) -> AuthResult<()> {
        self.insert_raw(record);
        Ok(())
    }

    async fn find(&self, email: &str, purpose: OtpPurpose) -> AuthResult<Option<OneTimeCode>> {
        Ok(self
            .codes
            .lock()
            .expect("code map lock poisoned")
            .get(&(email.to_string(), purpose))
            .cloned())
    }

    async fn delete(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        self.codes
            .lock()
            .expect("code map lock poisoned")
            .remove(&(email.to_string(), purpose));
        Ok(())
    }

    async fn increment_attempts(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        let mut codes = self.codes.lock().expect("code map lock poisoned");
        if let Some(record) = codes.get_mut(&(email.to_string(), purpose)) {
            record.attempts += 1;
        }
        Ok(())
    }

    async fn mark_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        let mut codes = self.codes.lock().expect("code map lock poisoned");
        if let Some(record) = codes.get_mut(&(email.to_string(), purpose)) {
            record.verified = true;
        }
        Ok(())
    }

    async fn consume_matching(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<bool> {
        // The map lock makes check-and-remove a single step, mirroring the
        // conditional DELETE of the PostgreSQL backend.
        let mut codes = self.codes.lock().expect("code map lock poisoned");
        let key = (email.to_string(), purpose);
        match codes.get(&key) {
            Some(record) if record.code == code => {
                codes.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<bool> {
        let mut codes = self.codes.lock().expect("code map lock poisoned");
        let key = (email.to_string(), purpose);
        match codes.get(&key) {
            Some(record) if record.verified => {
                codes.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let mut codes = self.codes.lock().expect("code map lock poisoned");
        let now = Utc::now();
        let before = codes.len();
        codes.retain(|_, record| record.expires_at >= now);
        Ok((before - codes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(email: &str, purpose: OtpPurpose, value: &str) -> OneTimeCode {
        OneTimeCode {
            email: email.to_string(),
            purpose,
            code: value.to_string(),
            expires_at: Utc::now() + Duration::minutes(5),
            attempts: 0,
            verified: false,
        }
    }

    #[tokio::test]
    async fn replace_supersedes_prior_record() {
        let repo = MemoryOtpRepository::new();
        repo.replace(code("a@b.com", OtpPurpose::Registration, "111111"))
            .await
            .unwrap();
        repo.replace(code("a@b.com", OtpPurpose::Registration, "222222"))
            .await
            .unwrap();

        let stored = repo
            .find("a@b.com", OtpPurpose::Registration)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.code, "222222");
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn purposes_are_scoped_independently() {
        let repo = MemoryOtpRepository::new();
        repo.replace(code("a@b.com", OtpPurpose::Registration, "111111"))
            .await
            .unwrap();
        repo.replace(code("a@b.com", OtpPurpose::ResetPassword, "222222"))
            .await
            .unwrap();

        assert!(repo.consume_matching("a@b.com", OtpPurpose::Registration, "111111").await.unwrap());
        // The reset-password record is untouched.
        assert!(repo.find("a@b.com", OtpPurpose::ResetPassword).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn consume_matching_has_one_winner() {
        let repo = MemoryOtpRepository::new();
        repo.replace(code("a@b.com", OtpPurpose::Registration, "123456"))
            .await
            .unwrap();

        assert!(repo.consume_matching("a@b.com", OtpPurpose::Registration, "123456").await.unwrap());
        assert!(!repo.consume_matching("a@b.com", OtpPurpose::Registration, "123456").await.unwrap());
    }

    #[tokio::test]
    async fn take_verified_requires_verified_flag() {
        let repo = MemoryOtpRepository::new();
        repo.replace(code("a@b.com", OtpPurpose::ResetPassword, "123456"))
            .await
            .unwrap();

        assert!(!repo.take_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap());
        repo.mark_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap();
        assert!(repo.take_verified("a@b.com", OtpPurpose::ResetPassword).await.unwrap());
        assert!(repo.find("a@b.com", OtpPurpose::ResetPassword).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_expired_removes_only_aged_records() {
        let repo = MemoryOtpRepository::new();
        let mut expired = code("old@b.com", OtpPurpose::Registration, "111111");
        expired.expires_at = Utc::now() - Duration::seconds(1);
        repo.insert_raw(expired);
        repo.replace(code("new@b.com", OtpPurpose::ResetPassword, "222222"))
            .await
            .unwrap();

        assert_eq!(repo.purge_expired().await.unwrap(), 1);
        assert!(repo.find("old@b.com", OtpPurpose::Registration).await.unwrap().is_none());
        assert!(repo.find("new@b.com", OtpPurpose::ResetPassword).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn user_crud_roundtrip() {
        let repo = MemoryUserRepository::new();
        let user = repo
            .create(NewUser {
                email: "a@b.com".to_string(),
                username: "alice".to_string(),
                password_hash: Some("hash".to_string()),
                role: "user".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(repo.find_by_email("a@b.com").await.unwrap().unwrap().id, user.id);
        assert_eq!(repo.find_by_username("alice").await.unwrap().unwrap().id, user.id);

        repo.update_password(user.id, "new-hash").await.unwrap();
        let reloaded = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash.as_deref(), Some("new-hash"));

        let renamed = repo.update_username(user.id, "alice2").await.unwrap().unwrap();
        assert_eq!(renamed.username, "alice2");
    }
}
