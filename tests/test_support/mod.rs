#![allow(dead_code)]

use attendd::api::{build_router, AppState};
use attendd::config::Config;
use attendd::db;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::json;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "attendd-test-secret";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos(),
        uuid::Uuid::new_v4()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn test_state(prefix: &str) -> AppState {
    let workspace = temp_dir(prefix);
    let mut config = Config::new(TEST_SECRET, workspace.clone());
    config.bcrypt_cost = 4;
    let conn = db::open_db(&workspace).expect("open db");
    AppState::new(config, conn)
}

pub fn test_app(prefix: &str) -> (Router, AppState) {
    let state = test_state(prefix);
    (build_router(state.clone()), state)
}

pub struct Reply {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: serde_json::Value,
}

impl Reply {
    /// `name=value` part of the Set-Cookie header, ready to send back.
    pub fn cookie_pair(&self) -> String {
        let raw = self.set_cookie.as_deref().expect("set-cookie header");
        raw.split(';').next().unwrap_or("").trim().to_string()
    }
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    cookie: Option<&str>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    let request = match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("oneshot");
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    Reply {
        status,
        set_cookie,
        body,
    }
}

/// Signs up a teacher and returns the auth number, read back from storage
/// since signup never discloses it.
pub async fn signup_teacher(app: &Router, state: &AppState, email: &str) -> String {
    let reply = send(
        app,
        "POST",
        "/signup",
        Some(json!({ "name": "T", "email": email, "password": "pw", "role": "teacher" })),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    stored_auth_number(state, email)
}

pub fn stored_auth_number(state: &AppState, email: &str) -> String {
    let conn = state.db.lock().expect("db lock");
    conn.query_row(
        "SELECT auth_number FROM users WHERE email = ?",
        [email],
        |r| r.get(0),
    )
    .expect("teacher auth number")
}

pub async fn signup_student(app: &Router, email: &str, roll_number: &str) {
    let reply = send(
        app,
        "POST",
        "/signup",
        Some(json!({
            "name": format!("Student {}", roll_number),
            "email": email,
            "password": "pw",
            "role": "student",
            "rollNumber": roll_number,
        })),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
}

/// Signs up and logs in a teacher; returns the cookie to send back.
pub async fn teacher_cookie(app: &Router, state: &AppState, email: &str) -> String {
    let auth_number = signup_teacher(app, state, email).await;
    let reply = send(
        app,
        "POST",
        "/login",
        Some(json!({ "email": email, "password": "pw", "role": "teacher", "authNumber": auth_number })),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.cookie_pair()
}

pub async fn student_cookie(app: &Router, email: &str, roll_number: &str) -> String {
    signup_student(app, email, roll_number).await;
    let reply = send(
        app,
        "POST",
        "/login",
        Some(json!({ "email": email, "password": "pw", "role": "student" })),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.cookie_pair()
}
