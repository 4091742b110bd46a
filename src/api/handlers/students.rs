use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Local};
use rusqlite::Connection;
use serde_json::json;

use crate::api::error::ApiError;
use crate::api::guard::AuthUser;
use crate::api::handlers::attendance::day_key;
use crate::api::types::AppState;

pub const NOT_MARKED: &str = "Not Marked";

/// Every student with their status for the day containing `now`.
pub fn list_students_with_attendance(
    conn: &Connection,
    now: DateTime<Local>,
) -> Result<Vec<serde_json::Value>, ApiError> {
    let day = day_key(now);
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.roll_number, u.email, a.status
         FROM users u
         LEFT JOIN attendance a ON a.student_id = u.id AND a.day = ?
         WHERE u.role = 'student'
         ORDER BY u.rowid",
    )?;
    let rows = stmt
        .query_map([&day], |r| {
            Ok(json!({
                "_id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "rollNumber": r.get::<_, Option<String>>(2)?,
                "email": r.get::<_, String>(3)?,
                "attendanceStatus": r
                    .get::<_, Option<String>>(4)?
                    .unwrap_or_else(|| NOT_MARKED.to_string()),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn handle_list_students(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let students = {
        let conn = state.conn()?;
        list_students_with_attendance(&conn, Local::now())?
    };
    tracing::debug!(user_id = %user.id, count = students.len(), "listed students");
    Ok(Json(students))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/students", get(handle_list_students))
}
