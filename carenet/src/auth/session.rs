//! Session tokens.
//!
//! A session is a signed HS256 JWT carrying the user's identity and role
//! grants. The same token is set as the HTTP-only session cookie and
//! accepted as a bearer token, so browser and API clients share one format.
//! Roles ride in the token: permission checks never hit the database, at
//! the cost that a role change only takes effect on the next login.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    api::models::users::{CurrentUser, Role},
    config::Config,
    errors::Error,
    types::UserId,
};

/// Claims embedded in a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: UserId,
    pub email: String,
    pub username: String,
    /// Marketplace roles granted at login time
    pub roles: Vec<Role>,
    pub is_admin: bool,
    /// Expiry (unix seconds), enforced by [`verify_session_token`]
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    fn for_user(user: &CurrentUser, config: &Config) -> Self {
        let issued = Utc::now();
        Self {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles: user.roles.clone(),
            is_admin: user.is_admin,
            exp: (issued + config.auth.jwt_expiry).timestamp(),
            iat: issued.timestamp(),
        }
    }
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            username: claims.username,
            roles: claims.roles,
            is_admin: claims.is_admin,
            // The display name is not carried in the token
            display_name: None,
        }
    }
}

fn signing_secret(config: &Config) -> Result<&[u8], Error> {
    config
        .secret_key
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| Error::Internal {
            operation: "sign a session token without a secret_key".to_string(),
        })
}

/// Mint a session token for a logged-in user.
pub fn create_session_token(user: &CurrentUser, config: &Config) -> Result<String, Error> {
    let claims = SessionClaims::for_user(user, config);
    let key = EncodingKey::from_secret(signing_secret(config)?);
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("encode session token: {e}"),
    })
}

/// Verify a session token and recover the user it was minted for.
///
/// Anything wrong with the token itself (bad signature, expired, garbled)
/// is the client's problem and maps to 401; only key or serialization
/// failures on our side surface as internal errors.
pub fn verify_session_token(token: &str, config: &Config) -> Result<CurrentUser, Error> {
    let key = DecodingKey::from_secret(signing_secret(config)?);
    let data = decode::<SessionClaims>(token, &key, &Validation::default()).map_err(|e| match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_) => Error::Unauthenticated { message: None },
        _ => Error::Internal {
            operation: format!("verify session token: {e}"),
        },
    })?;
    Ok(CurrentUser::from(data.claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            auth: AuthConfig {
                jwt_expiry: Duration::from_secs(3600),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn user_with_roles(roles: Vec<Role>, is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "farida@example.com".to_string(),
            username: "farida".to_string(),
            roles,
            is_admin,
            display_name: Some("Farida Akter".to_string()),
        }
    }

    #[test]
    fn test_roles_survive_the_round_trip() {
        let config = test_config();
        // A caregiver who also runs an agency keeps both grants
        let user = user_with_roles(vec![Role::Caregiver, Role::Agency], false);

        let token = create_session_token(&user, &config).unwrap();
        let verified = verify_session_token(&token, &config).unwrap();

        assert_eq!(verified.id, user.id);
        assert_eq!(verified.username, user.username);
        assert_eq!(verified.roles, vec![Role::Caregiver, Role::Agency]);
        assert!(!verified.is_admin);
        // Display names are looked up fresh, not trusted from the token
        assert_eq!(verified.display_name, None);
    }

    #[test]
    fn test_admin_flag_is_carried() {
        let config = test_config();
        let admin = user_with_roles(vec![Role::Admin], true);

        let token = create_session_token(&admin, &config).unwrap();
        let verified = verify_session_token(&token, &config).unwrap();
        assert!(verified.is_admin);
    }

    #[test]
    fn test_foreign_signature_rejected_as_unauthenticated() {
        let mut config = test_config();
        let token = create_session_token(&user_with_roles(vec![Role::Guardian], false), &config).unwrap();

        config.secret_key = Some("a-different-secret".to_string());
        let err = verify_session_token(&token, &config).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_expired_token_rejected_as_unauthenticated() {
        let config = test_config();
        let user = user_with_roles(vec![Role::Guardian], false);

        let mut claims = SessionClaims::for_user(&user, &config);
        claims.exp = (Utc::now() - chrono::Duration::hours(1)).timestamp();
        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let stale = encode(&Header::default(), &claims, &key).unwrap();

        let err = verify_session_token(&stale, &config).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_garbage_tokens_rejected_as_unauthenticated() {
        let config = test_config();
        for token in ["", "not-a-jwt", "a.b", "too.many.parts.entirely.here"] {
            let err = verify_session_token(token, &config).unwrap_err();
            assert!(
                matches!(err, Error::Unauthenticated { .. }),
                "expected 401 for {token:?}"
            );
        }
    }

    #[test]
    fn test_missing_secret_is_an_internal_error() {
        let config = Config::default();
        let err = create_session_token(&user_with_roles(vec![Role::Guardian], false), &config).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }
}
