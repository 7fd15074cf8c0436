//! Access and refresh token issuance.
//!
//! Both classes are HS256 JWTs with the same claim set but distinct signing
//! secrets, so a leaked access token can never be replayed as a refresh
//! token. Access tokens live 15 minutes; refresh tokens 7 days.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::errors::{AuthError, AuthResult};
use super::models::{Claims, SessionTokens, TokenKind, User};

/// Access token lifetime
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);

/// Refresh token lifetime. Observed variants disagreed (1 vs 7 days);
/// 7 days is canonical here and matches the cookie Max-Age.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(7);

/// Mints and verifies the two token classes
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer with the standard lifetimes
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self::with_ttls(
            access_secret,
            refresh_secret,
            ACCESS_TOKEN_TTL,
            REFRESH_TOKEN_TTL,
        )
    }

    /// Create an issuer with explicit lifetimes
    pub fn with_ttls(
        access_secret: String,
        refresh_secret: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        }
    }

    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a token of the given class for a user
    pub fn issue(&self, user: &User, kind: TokenKind) -> AuthResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            exp: (now + self.ttl(kind)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret(kind).as_bytes()),
        )
        .map_err(|_| AuthError::Unauthenticated)
    }

    /// Mint a fresh access/refresh pair for a session
    pub fn issue_session(&self, user: &User) -> AuthResult<SessionTokens> {
        Ok(SessionTokens {
            access_token: self.issue(user, TokenKind::Access)?,
            refresh_token: self.issue(user, TokenKind::Refresh)?,
        })
    }

    /// Verify a token against the secret for its claimed class.
    ///
    /// A valid token of the other class fails here, as does anything
    /// expired or tampered with.
    pub fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret(kind).as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user() -> User {
        User {
            id: 42,
            email: "a@b.com".to_string(),
            username: "alice".to_string(),
            password_hash: None,
            role: "user".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("access-secret-access-secret-0123".into(), "refresh-secret-refresh-secret-01".into())
    }

    #[test]
    fn issue_and_verify_access_token() {
        let issuer = issuer();
        let token = issuer.issue(&test_user(), TokenKind::Access).unwrap();
        let claims = issuer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_classes_use_distinct_secrets() {
        let issuer = issuer();
        let tokens = issuer.issue_session(&test_user()).unwrap();

        // Access token must not verify as a refresh token, and vice versa.
        assert!(issuer.verify(&tokens.access_token, TokenKind::Refresh).is_err());
        assert!(issuer.verify(&tokens.refresh_token, TokenKind::Access).is_err());
        assert!(issuer.verify(&tokens.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // Beyond the default 60s validation leeway.
        let issuer = TokenIssuer::with_ttls(
            "access-secret-access-secret-0123".into(),
            "refresh-secret-refresh-secret-01".into(),
            Duration::minutes(-5),
            Duration::minutes(-5),
        );
        let token = issuer.issue(&test_user(), TokenKind::Access).unwrap();
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let issuer = issuer();
        assert!(issuer.verify("not.a.token", TokenKind::Access).is_err());
        assert!(issuer.verify("", TokenKind::Refresh).is_err());
    }
}
