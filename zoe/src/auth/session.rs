//! JWT session token creation and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    api::models::users::CurrentUser,
    config::Config,
    errors::{Error, ErrorCode},
    types::{Role, UserId},
};

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,      // Subject (user ID)
    pub username: String, // Username
    pub email: String,    // User email
    pub role: Role,       // Platform role at issue time
    pub exp: i64,         // Expiration time
    pub iat: i64,         // Issued at
}

impl SessionClaims {
    /// Create new session claims for a user
    pub fn new(user: &CurrentUser, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + config.auth.session.expiry;

        Self {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

fn secret_key(config: &Config) -> Result<&str, Error> {
    config
        .secret_key
        .as_deref()
        .ok_or_else(|| Error::internal("JWT sessions: secret_key is required"))
}

/// Create a JWT token for a user session, returning the token and its expiry
pub fn create_session_token(user: &CurrentUser, config: &Config) -> Result<(String, DateTime<Utc>), Error> {
    let claims = SessionClaims::new(user, config);
    let key = EncodingKey::from_secret(secret_key(config)?.as_bytes());

    let token = encode(&Header::default(), &claims, &key).map_err(|e| Error::internal(format!("create JWT: {e}")))?;
    Ok((token, claims.expires_at()))
}

/// Verify and decode a JWT session token
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionClaims, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?.as_bytes());
    let validation = Validation::default();

    let invalid = || Error::Unauthenticated {
        message: Some("Invalid or expired session token".to_string()),
        code: ErrorCode::InvalidToken,
    };

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => invalid(),

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::internal(format!("JWT verification: {e}")),

        // Catch-all for any future error variants (default to server error for safety)
        _ => Error::internal(format!("JWT verification (unknown error): {e}")),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_config() -> Config {
        let mut config = Config {
            secret_key: Some("test-secret-key-for-testing-only".to_string()),
            ..Default::default()
        };
        config.auth.session.expiry = Duration::from_secs(3600);
        config
    }

    fn test_user() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "layla".to_string(),
            email: "layla@example.com".to_string(),
            role: Role::Moderator,
        }
    }

    #[test]
    fn test_round_trip_claims() {
        let config = test_config();
        let user = test_user();

        let (token, expires_at) = create_session_token(&user, &config).unwrap();
        let claims = verify_session_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "layla");
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.expires_at(), expires_at);
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let config = test_config();
        let (token, _) = create_session_token(&test_user(), &config).unwrap();

        let other = Config {
            secret_key: Some("a-different-secret".to_string()),
            ..test_config()
        };
        let err = verify_session_token(&token, &other).unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthenticated {
                code: ErrorCode::InvalidToken,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_token_is_unauthenticated() {
        let err = verify_session_token("not.a.jwt", &test_config()).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let config = test_config();
        let user = test_user();
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret_key.as_deref().unwrap().as_bytes()),
        )
        .unwrap();

        assert!(matches!(verify_session_token(&token, &config), Err(Error::Unauthenticated { .. })));
    }
}
