//! Password hashing, verification, and the strength policy.
//!
//! Argon2id with the library defaults as the fixed work factor. Login flows
//! must call [`dummy_verify`] when the identifier resolves to no account so
//! that "unknown identifier" and "wrong password" take the same time.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::errors::{AuthError, AuthResult};

/// Symbols accepted (and required, at least one) by the strength policy.
const PASSWORD_SYMBOLS: &str = "@$!%*?&";

/// Syntactically valid Argon2id hash that matches no password. Verifying
/// against it performs the full key derivation, which is the point.
const DECOY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0c2FsdA$MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY";

/// Hash a password with Argon2id and a fresh random salt
pub fn hash(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingFailed)?
        .to_string())
}

/// Verify a password against a stored hash
pub fn verify(password: &str, hash: &str) -> AuthResult<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Burn the same key-derivation time a real comparison would.
///
/// Call this on the unknown-identifier path before returning the generic
/// credentials error.
pub fn dummy_verify(password: &str) {
    let _ = verify(password, DECOY_HASH);
}

/// Enforce the registration/reset strength policy: at least 8 characters,
/// one lowercase, one uppercase, one digit, one symbol from the fixed set,
/// and nothing outside that alphabet.
pub fn validate_strength(password: &str) -> AuthResult<()> {
    let long_enough = password.len() >= 8;
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));
    let in_alphabet = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c));

    if long_enough && has_lower && has_upper && has_digit && has_symbol && in_alphabet {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(
            "Password must be at least 8 characters long, contain at least one uppercase letter, \
             one lowercase letter, one number and one special character"
                .to_string(),
        ))
    }
}
