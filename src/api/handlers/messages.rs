//! Time-limited announcements.
//!
//! A message is visible while `start_time <= now < expires_at`. Rows leave the
//! table three ways: a one-shot timer scheduled at creation, the periodic
//! sweep, and (for reads only) the visibility filter itself. The timer is lost
//! on restart; the sweep and the filter are not.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::guard::{AuthUser, Authorized, TeacherOnly};
use crate::api::helpers::{get_str, json_body, millis_to_rfc3339};
use crate::api::types::AppState;

const MILLIS_PER_MINUTE: i64 = 60_000;
/// Thirty days. Longer announcements would park a timer task for as long.
pub const MAX_DURATION_MINUTES: i64 = 30 * 24 * 60;

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub text: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub teacher_id: String,
    pub text: String,
    pub duration_minutes: i64,
    pub start_time: i64,
    pub expires_at: i64,
}

impl MessageRecord {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "_id": self.id,
            "teacherId": self.teacher_id,
            "message": self.text,
            "duration": self.duration_minutes,
            "startTime": millis_to_rfc3339(self.start_time),
            "expiresAt": millis_to_rfc3339(self.expires_at),
        })
    }
}

/// Whole minutes, given as a JSON integer, an integral float, or a numeric string.
fn parse_duration_minutes(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn parse_new_message(params: &serde_json::Value) -> Result<NewMessage, ApiError> {
    let text = get_str(params, "message");
    let duration = params.get("duration").filter(|v| !v.is_null());
    let (Some(text), Some(duration)) = (text, duration) else {
        return Err(ApiError::validation("Message and duration are required"));
    };
    match parse_duration_minutes(duration) {
        Some(0) => Err(ApiError::validation("Message and duration are required")),
        Some(minutes) if minutes > MAX_DURATION_MINUTES => Err(ApiError::validation(format!(
            "duration must be at most {} minutes",
            MAX_DURATION_MINUTES
        ))),
        Some(minutes) if minutes > 0 => Ok(NewMessage {
            text,
            duration_minutes: minutes,
        }),
        _ => Err(ApiError::validation(
            "duration must be a positive whole number of minutes",
        )),
    }
}

pub fn create_message(
    conn: &Connection,
    teacher_id: &str,
    input: &NewMessage,
    now: DateTime<Utc>,
) -> Result<MessageRecord, ApiError> {
    let start_time = now.timestamp_millis();
    let expires_at = input
        .duration_minutes
        .checked_mul(MILLIS_PER_MINUTE)
        .and_then(|d| start_time.checked_add(d))
        .ok_or_else(|| ApiError::validation("duration is too large"))?;
    let record = MessageRecord {
        id: Uuid::new_v4().to_string(),
        teacher_id: teacher_id.to_string(),
        text: input.text.clone(),
        duration_minutes: input.duration_minutes,
        start_time,
        expires_at,
    };
    conn.execute(
        "INSERT INTO messages(id, teacher_id, message, duration_minutes, start_time, expires_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.teacher_id,
            &record.text,
            record.duration_minutes,
            record.start_time,
            record.expires_at,
        ),
    )?;
    Ok(record)
}

pub fn list_active(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<MessageRecord>, ApiError> {
    let now = now.timestamp_millis();
    let mut stmt = conn.prepare(
        "SELECT id, teacher_id, message, duration_minutes, start_time, expires_at
         FROM messages
         WHERE start_time <= ?1 AND expires_at > ?1
         ORDER BY start_time, rowid",
    )?;
    let rows = stmt
        .query_map([now], |r| {
            Ok(MessageRecord {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                text: r.get(2)?,
                duration_minutes: r.get(3)?,
                start_time: r.get(4)?,
                expires_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_message(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM messages WHERE id = ?", [id])? > 0)
}

/// Deletes every message whose window has closed by `now`.
pub fn sweep_expired(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM messages WHERE expires_at <= ?",
        [now.timestamp_millis()],
    )
}

/// Fire-and-forget deletion of one message after `after`. Failures are logged only.
pub fn schedule_deletion(db: Arc<Mutex<Connection>>, id: String, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let result = match db.lock() {
            Ok(conn) => delete_message(&conn, &id).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(true) => tracing::debug!(message_id = %id, "expired message deleted"),
            Ok(false) => tracing::debug!(message_id = %id, "expired message already gone"),
            Err(e) => tracing::warn!(message_id = %id, error = %e, "failed to delete expired message"),
        }
    })
}

/// Periodically removes expired messages. The first sweep runs immediately.
pub fn spawn_sweeper(db: Arc<Mutex<Connection>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = match db.lock() {
                Ok(conn) => sweep_expired(&conn, Utc::now()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(0) => {}
                Ok(n) => tracing::info!(deleted = n, "swept expired messages"),
                Err(e) => tracing::warn!(error = %e, "message sweep failed"),
            }
        }
    })
}

async fn handle_create_message(
    State(state): State<AppState>,
    Authorized { user, .. }: Authorized<TeacherOnly>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let params = json_body(body)?;
    let input = parse_new_message(&params)?;
    let record = {
        let conn = state.conn()?;
        create_message(&conn, &user.id, &input, Utc::now())?
    };

    let lifetime = Duration::from_secs(record.duration_minutes as u64 * 60);
    schedule_deletion(state.db.clone(), record.id.clone(), lifetime);
    tracing::info!(
        message_id = %record.id,
        teacher_id = %user.id,
        duration_minutes = record.duration_minutes,
        "message created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Message created successfully",
            "newMessage": record.to_json(),
        })),
    ))
}

async fn handle_list_messages(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let active = {
        let conn = state.conn()?;
        list_active(&conn, Utc::now())?
    };
    let messages: Vec<serde_json::Value> = active.iter().map(MessageRecord::to_json).collect();
    Ok(Json(json!({ "messages": messages })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/messages",
        get(handle_list_messages).post(handle_create_message),
    )
}
