use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::helpers::{get_str, get_str_or_number, json_body};
use crate::api::session;
use crate::api::types::{AppState, Role};
use crate::db;

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    /// Always `Some` for students, always `None` for teachers.
    pub roll_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub id: String,
    pub role: Role,
    pub auth_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub auth_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub id: String,
    pub role: Role,
    pub password_hash: String,
    pub auth_number: Option<String>,
}

pub fn parse_signup(params: &serde_json::Value) -> Result<SignupInput, ApiError> {
    let (Some(name), Some(email), Some(password), Some(role)) = (
        get_str(params, "name"),
        get_str(params, "email"),
        get_str(params, "password"),
        get_str(params, "role"),
    ) else {
        return Err(ApiError::validation("All fields are required"));
    };
    let Some(role) = Role::parse(&role) else {
        return Err(ApiError::validation(
            "Invalid role. Must be student or teacher.",
        ));
    };
    let roll_number = match role {
        Role::Student => match get_str_or_number(params, "rollNumber") {
            Some(r) => Some(r),
            None => return Err(ApiError::validation("Roll number is required for students")),
        },
        Role::Teacher => None,
    };
    Ok(SignupInput {
        name,
        email,
        password,
        role,
        roll_number,
    })
}

pub fn parse_login(params: &serde_json::Value) -> Result<LoginInput, ApiError> {
    let email = get_str(params, "email");
    let password = get_str(params, "password");
    let wants_teacher = get_str(params, "role").as_deref() == Some("teacher");
    let auth_number = get_str_or_number(params, "authNumber");
    match (email, password) {
        (Some(email), Some(password)) if !(wants_teacher && auth_number.is_none()) => Ok(LoginInput {
            email,
            password,
            auth_number,
        }),
        _ => Err(ApiError::validation("All fields are required")),
    }
}

/// Five digits, never starting with zero.
pub fn generate_auth_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(10_000..100_000u32).to_string()
}

fn auth_number_taken(conn: &Connection, auth_number: &str) -> Result<bool, ApiError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM users WHERE auth_number = ?",
            [auth_number],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn unique_auth_number(conn: &Connection) -> Result<String, ApiError> {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = generate_auth_number(&mut rng);
        if !auth_number_taken(conn, &candidate)? {
            return Ok(candidate);
        }
        tracing::debug!("auth number collision, regenerating");
    }
}

pub fn email_registered(conn: &Connection, email: &str) -> Result<bool, ApiError> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [email], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Inserts the user. Storage constraints are authoritative for uniqueness:
/// an auth-number clash regenerates, email and roll-number clashes are conflicts.
pub fn insert_user(
    conn: &Connection,
    input: &SignupInput,
    password_hash: &str,
) -> Result<CreatedUser, ApiError> {
    let id = Uuid::new_v4().to_string();
    loop {
        let auth_number = match input.role {
            Role::Teacher => Some(unique_auth_number(conn)?),
            Role::Student => None,
        };
        let inserted = conn.execute(
            "INSERT INTO users(id, name, email, password_hash, role, roll_number, auth_number, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &input.name,
                &input.email,
                password_hash,
                input.role.as_str(),
                &input.roll_number,
                &auth_number,
                Utc::now().timestamp_millis(),
            ),
        );
        match inserted {
            Ok(_) => {
                return Ok(CreatedUser {
                    id,
                    role: input.role,
                    auth_number,
                })
            }
            Err(e) => match db::unique_violation(&e) {
                Some(msg) if msg.contains("users.auth_number") => {
                    tracing::debug!("auth number taken at insert, regenerating");
                }
                Some(msg) if msg.contains("users.email") => {
                    return Err(ApiError::conflict("User already exists"));
                }
                Some(msg) if msg.contains("users.roll_number") => {
                    return Err(ApiError::conflict("Roll number already registered"));
                }
                _ => return Err(e.into()),
            },
        }
    }
}

pub fn find_credentials(conn: &Connection, email: &str) -> Result<Option<StoredCredentials>, ApiError> {
    let row = conn
        .query_row(
            "SELECT id, role, password_hash, auth_number FROM users WHERE email = ?",
            [email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, role, password_hash, auth_number)) = row else {
        return Ok(None);
    };
    let role = Role::parse(&role)
        .ok_or_else(|| ApiError::internal("bad_row", format!("user {} has role {:?}", id, role)))?;
    Ok(Some(StoredCredentials {
        id,
        role,
        password_hash,
        auth_number,
    }))
}

/// Teachers must present their auth number; students are never asked for one.
pub fn check_auth_number(stored: &StoredCredentials, supplied: Option<&str>) -> Result<(), ApiError> {
    if stored.role != Role::Teacher {
        return Ok(());
    }
    match (stored.auth_number.as_deref(), supplied) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(ApiError::unauthenticated(
            "Unauthorized: Incorrect authentication number",
        )),
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::internal("hash_task_failed", e))?
        .map_err(|e| ApiError::internal("hash_failed", e))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::internal("hash_task_failed", e))?
        .map_err(|e| ApiError::internal("hash_verify_failed", e))
}

async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let params = json_body(body)?;
    let input = parse_signup(&params)?;

    // Cheap pre-check so duplicate signups skip the hash; the insert re-checks.
    let taken = {
        let conn = state.conn()?;
        email_registered(&conn, &input.email)?
    };
    if taken {
        return Err(ApiError::conflict("User already exists"));
    }
    let password_hash = hash_password(input.password.clone(), state.config.bcrypt_cost).await?;
    let created = {
        let conn = state.conn()?;
        insert_user(&conn, &input, &password_hash)?
    };

    tracing::info!(
        user_id = %created.id,
        role = created.role.as_str(),
        "user signed up"
    );
    // The auth number stays in storage; it is handed out out-of-band.
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully!" })),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let params = json_body(body)?;
    let input = parse_login(&params)?;

    let stored = {
        let conn = state.conn()?;
        find_credentials(&conn, &input.email)?
    };
    let Some(stored) = stored else {
        tracing::warn!(email = %input.email, "login for unknown user");
        return Err(ApiError::unauthenticated("User Not Found"));
    };
    if let Err(e) = check_auth_number(&stored, input.auth_number.as_deref()) {
        tracing::warn!(user_id = %stored.id, "login with wrong auth number");
        return Err(e);
    }
    if !verify_password(input.password, stored.password_hash.clone()).await? {
        tracing::warn!(user_id = %stored.id, "login with wrong password");
        return Err(ApiError::unauthenticated("Invalid credentials"));
    }

    let token = session::issue_token(
        &state.config.jwt_secret,
        &stored.id,
        stored.role,
        state.config.token_ttl,
    )?;
    tracing::info!(user_id = %stored.id, role = stored.role.as_str(), "login succeeded");
    let jar = jar.add(session::session_cookie(token.clone(), state.config.cookie_max_age));
    Ok((
        jar,
        Json(json!({
            "message": "Login successful",
            "token": token,
            "role": stored.role,
        })),
    ))
}

async fn handle_logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.add(session::cleared_cookie()),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(handle_signup))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
}
