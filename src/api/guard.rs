//! Access control.
//!
//! [`AuthUser`] is the only proof of authentication, and [`authorize`] only
//! accepts an `AuthUser`, so a role check can never run against a request
//! that skipped authentication. Handlers use the extractors directly:
//!
//! ```ignore
//! async fn any_user(user: AuthUser) { /* ... */ }
//! async fn teachers(Authorized { user, .. }: Authorized<TeacherOnly>) { /* ... */ }
//! ```

use std::marker::PhantomData;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;

use crate::api::error::ApiError;
use crate::api::session::{self, SESSION_COOKIE};
use crate::api::types::{AppState, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

pub fn authenticate(jar: &CookieJar, secret: &str) -> Result<AuthUser, ApiError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value()).filter(|v| !v.is_empty()) else {
        return Err(ApiError::unauthenticated("No token provided"));
    };
    match session::verify_token(secret, token) {
        Ok(claims) => Ok(AuthUser {
            id: claims.id,
            role: claims.role,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "rejected session token");
            Err(ApiError::forbidden("Invalid token"))
        }
    }
}

pub fn authorize(user: AuthUser, allowed: &[Role]) -> Result<AuthUser, ApiError> {
    if allowed.contains(&user.role) {
        Ok(user)
    } else {
        tracing::debug!(user_id = %user.id, role = user.role.as_str(), "role not permitted");
        Err(ApiError::forbidden(
            "Access denied. You do not have permission to access this.",
        ))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        authenticate(&jar, &state.config.jwt_secret)
    }
}

/// Set of roles a route admits.
pub trait RolePolicy {
    const ALLOWED: &'static [Role];
}

pub struct TeacherOnly;

impl RolePolicy for TeacherOnly {
    const ALLOWED: &'static [Role] = &[Role::Teacher];
}

/// An authenticated user whose role passed `P`.
pub struct Authorized<P> {
    pub user: AuthUser,
    _policy: PhantomData<fn() -> P>,
}

#[axum::async_trait]
impl<P> FromRequestParts<AppState> for Authorized<P>
where
    P: RolePolicy,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let user = authorize(user, P::ALLOWED)?;
        Ok(Authorized {
            user,
            _policy: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
    use std::time::Duration;

    const SECRET: &str = "guard-secret";

    fn jar_with(token: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token)).unwrap(),
        );
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn missing_cookie_is_401() {
        let e = authenticate(&CookieJar::new(), SECRET).unwrap_err();
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn garbage_token_is_403() {
        let e = authenticate(&jar_with("not.a.jwt"), SECRET).unwrap_err();
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
        assert_eq!(e.message(), "Invalid token");
    }

    #[test]
    fn valid_token_yields_user() {
        let token = session::issue_token(SECRET, "s1", Role::Student, Duration::from_secs(60)).unwrap();
        let user = authenticate(&jar_with(&token), SECRET).unwrap();
        assert_eq!(
            user,
            AuthUser {
                id: "s1".into(),
                role: Role::Student
            }
        );
    }

    #[test]
    fn authorize_checks_role() {
        let student = AuthUser {
            id: "s1".into(),
            role: Role::Student,
        };
        let e = authorize(student.clone(), TeacherOnly::ALLOWED).unwrap_err();
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
        assert!(authorize(student, &[Role::Student, Role::Teacher]).is_ok());
    }
}
