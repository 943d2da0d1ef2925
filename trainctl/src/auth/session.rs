//! JWT session token verification.
//!
//! Sessions are issued by the login service and shared with this service through a cookie
//! signed with `secret_key` (HS256).

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{auth::current_user::CurrentUser, config::Config, errors::Error, types::UserId};

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId, // Subject (user ID)
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

#[cfg(test)]
impl SessionClaims {
    pub fn new(user: &CurrentUser, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: user.id,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        Self { id: claims.sub }
    }
}

fn secret_key(config: &Config) -> Result<&str, Error> {
    config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "JWT sessions: secret_key is required".to_string(),
    })
}

/// Create a JWT token for a user session. Production sessions come from the login service.
#[cfg(test)]
pub fn create_session_token(user: &CurrentUser, ttl: chrono::Duration, config: &Config) -> Result<String, Error> {
    let claims = SessionClaims::new(user, ttl);
    let key = jsonwebtoken::EncodingKey::from_secret(secret_key(config)?.as_bytes());
    jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify and decode a JWT session token
pub fn verify_session_token(token: &str, config: &Config) -> Result<CurrentUser, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    Ok(CurrentUser::from(token_data.claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;
    use uuid::Uuid;

    fn user() -> CurrentUser {
        CurrentUser { id: Uuid::new_v4() }
    }

    #[test]
    fn test_round_trip() {
        let config = test_config();
        let user = user();
        let token = create_session_token(&user, chrono::Duration::hours(1), &config).unwrap();
        let verified = verify_session_token(&token, &config).unwrap();
        assert_eq!(verified, user);
    }

    #[test]
    fn test_expired_token_is_unauthenticated() {
        let config = test_config();
        let token = create_session_token(&user(), chrono::Duration::hours(-2), &config).unwrap();
        assert!(matches!(
            verify_session_token(&token, &config),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let config = test_config();
        let token = create_session_token(&user(), chrono::Duration::hours(1), &config).unwrap();

        let mut other = test_config();
        other.secret_key = Some("a-different-secret".to_string());
        assert!(matches!(
            verify_session_token(&token, &other),
            Err(Error::Unauthenticated { .. })
        ));
        assert!(matches!(
            verify_session_token("not.a.jwt", &config),
            Err(Error::Unauthenticated { .. })
        ));
    }
}
