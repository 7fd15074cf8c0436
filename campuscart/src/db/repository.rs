//! Repository trait definitions and their PostgreSQL implementations.
//!
//! The auth manager only ever sees these traits, so the backing store is
//! swappable: PostgreSQL in production, the in-memory implementations in
//! [`super::memory`] for tests and single-node development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::auth::errors::AuthResult;
use crate::auth::models::{NewUser, OneTimeCode, OtpPurpose, User, UserId};

/// Account storage operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new account
    async fn create(&self, new_user: NewUser) -> AuthResult<User>;

    /// Find account by id
    async fn find_by_id(&self, id: UserId) -> AuthResult<Option<User>>;

    /// Find account by email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find account by username
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Replace the stored password hash
    async fn update_password(&self, id: UserId, password_hash: &str) -> AuthResult<()>;

    /// Change the username, returning the updated account
    async fn update_username(&self, id: UserId, username: &str) -> AuthResult<Option<User>>;
}

/// One-time-code storage operations.
///
/// The invariant "at most one live code per (email, purpose)" is enforced
/// here: `replace` atomically supersedes any prior record for the pair, and
/// `consume_matching` is the single-step find-and-delete that makes
/// concurrent verifications race to at most one winner.
#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Store a code, superseding any existing record for its (email, purpose)
    async fn replace(&self, record: OneTimeCode) -> AuthResult<()>;

    /// Fetch the live record for an (email, purpose), if any
    async fn find(&self, email: &str, purpose: OtpPurpose) -> AuthResult<Option<OneTimeCode>>;

    /// Drop the record for an (email, purpose)
    async fn delete(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()>;

    /// Bump the failed-attempt counter
    async fn increment_attempts(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()>;

    /// Flag the record as verified (reset-password flow keeps it around)
    async fn mark_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()>;

    /// Atomically delete the record if its code matches; returns whether
    /// this caller won the delete
    async fn consume_matching(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<bool>;

    /// Atomically delete the record if it was verified; returns whether a
    /// verified record existed
    async fn take_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<bool>;

    /// Delete every record past its expiry, returning how many were
    /// removed; meant to run on a timer so abandoned codes do not pile up
    async fn purge_expired(&self) -> AuthResult<u64>;
}

/// PostgreSQL implementation of [`UserRepository`]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }
    }
}

const USER_COLUMNS: &str = "id, email, username, password_hash, role, created_at, updated_at";

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (email, username, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_to_user(&row))
    }

    async fn find_by_id(&self, id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> AuthResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_username(&self, id: UserId, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users SET username = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }
}

/// PostgreSQL implementation of [`OtpRepository`].
///
/// `(email, purpose)` is the primary key, so `replace` is a plain upsert
/// and the one-live-code invariant holds without a separate delete.
pub struct PgOtpRepository {
    pool: PgPool,
}

impl PgOtpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpRepository for PgOtpRepository {
    async fn replace(&self, record: OneTimeCode) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO one_time_codes (email, purpose, code, expires_at, attempts, verified) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (email, purpose) DO UPDATE \
             SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at, \
                 attempts = EXCLUDED.attempts, verified = EXCLUDED.verified",
        )
        .bind(&record.email)
        .bind(record.purpose.as_str())
        .bind(&record.code)
        .bind(record.expires_at)
        .bind(record.attempts)
        .bind(record.verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, email: &str, purpose: OtpPurpose) -> AuthResult<Option<OneTimeCode>> {
        let row = sqlx::query(
            "SELECT code, expires_at, attempts, verified FROM one_time_codes \
             WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| OneTimeCode {
            email: email.to_string(),
            purpose,
            code: row.get("code"),
            expires_at: row.get::<DateTime<Utc>, _>("expires_at"),
            attempts: row.get("attempts"),
            verified: row.get("verified"),
        }))
    }

    async fn delete(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        sqlx::query("DELETE FROM one_time_codes WHERE email = $1 AND purpose = $2")
            .bind(email)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_attempts(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        sqlx::query(
            "UPDATE one_time_codes SET attempts = attempts + 1 \
             WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<()> {
        sqlx::query(
            "UPDATE one_time_codes SET verified = TRUE WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_matching(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<bool> {
        // Single-step conditional delete: concurrent racers see at most
        // one row returned.
        let row = sqlx::query(
            "DELETE FROM one_time_codes \
             WHERE email = $1 AND purpose = $2 AND code = $3 RETURNING email",
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn take_verified(&self, email: &str, purpose: OtpPurpose) -> AuthResult<bool> {
        let row = sqlx::query(
            "DELETE FROM one_time_codes \
             WHERE email = $1 AND purpose = $2 AND verified RETURNING email",
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        // Served by idx_one_time_codes_expires_at.
        let result = sqlx::query("DELETE FROM one_time_codes WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
