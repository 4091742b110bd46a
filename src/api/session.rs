//! Session tokens and the cookie that carries them.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::Role;

pub const SESSION_COOKIE: &str = "token";

/// Signed session payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(secret: &str, user_id: &str, role: Role, ttl: Duration) -> Result<String, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        id: user_id.to_string(),
        role,
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal("token_sign_failed", e))
}

/// Fails on bad signature, malformed payload, or expiry.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

pub fn session_cookie(token: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::seconds(max_age.as_secs() as i64))
        .build()
}

/// Empty, immediately-expiring replacement for the session cookie.
pub fn cleared_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn issued_token_verifies() {
        let token = issue_token(SECRET, "u1", Role::Teacher, Duration::from_secs(60)).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.id, "u1");
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, "u1", Role::Student, Duration::from_secs(60)).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: "u1".into(),
            role: Role::Student,
            iat: now - 100,
            exp: now - 10,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn cookies_carry_session_attributes() {
        let c = session_cookie("abc".into(), Duration::from_secs(7200));
        assert_eq!(c.name(), SESSION_COOKIE);
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::None));
        assert_eq!(c.max_age(), Some(time::Duration::seconds(7200)));

        let cleared = cleared_cookie();
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
    }
}
