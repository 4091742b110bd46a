use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

use crate::api::session::{self, SESSION_COOKIE};
use crate::api::types::AppState;

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Session probe for the frontend. Never fails; a bad token just reads as logged out.
async fn handle_logged_in(State(state): State<AppState>, jar: CookieJar) -> Json<serde_json::Value> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Json(json!({ "isLoggedIn": false }));
    };
    match session::verify_token(&state.config.jwt_secret, &token) {
        Ok(claims) => Json(json!({ "isLoggedIn": true, "user": claims })),
        Err(_) => Json(json!({ "isLoggedIn": false })),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handle_health))
        .route("/loggedIn", get(handle_logged_in))
}
