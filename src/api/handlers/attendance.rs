use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::guard::{Authorized, TeacherOnly};
use crate::api::helpers::{get_str_or_number, json_body, millis_to_rfc3339};
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceEntry {
    pub roll_number: String,
    pub status: AttendanceStatus,
}

/// Ledger key for "today": the server-local calendar date.
pub fn day_key(now: DateTime<Local>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

pub fn parse_attendance_data(params: &serde_json::Value) -> Result<Vec<AttendanceEntry>, ApiError> {
    let Some(rows) = params
        .get("attendanceData")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
    else {
        return Err(ApiError::validation("Invalid input data"));
    };
    rows.iter()
        .map(|row| {
            let roll_number = get_str_or_number(row, "rollNumber");
            let status = row
                .get("status")
                .and_then(|v| v.as_str())
                .and_then(AttendanceStatus::parse);
            match (roll_number, status) {
                (Some(roll_number), Some(status)) => Ok(AttendanceEntry {
                    roll_number,
                    status,
                }),
                _ => Err(ApiError::validation(
                    "Invalid input for roll number or status",
                )),
            }
        })
        .collect()
}

fn student_id_for_roll(conn: &Connection, roll_number: &str) -> Result<Option<String>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE roll_number = ? AND role = 'student'",
            [roll_number],
            |r| r.get(0),
        )
        .optional()?)
}

fn marked_on(conn: &Connection, student_id: &str, day: &str) -> Result<bool, ApiError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM attendance WHERE student_id = ? AND day = ?",
            (student_id, day),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Records one batch for the day containing `now`.
///
/// The batch commits only if every roll number resolves and none is already
/// marked for the day; otherwise nothing is written.
pub fn mark_attendance(
    conn: &Connection,
    entries: &[AttendanceEntry],
    now: DateTime<Local>,
) -> Result<Vec<serde_json::Value>, ApiError> {
    let day = day_key(now);
    let created_at = now.timestamp_millis();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::internal("db_tx_failed", e))?;
    let mut records = Vec::with_capacity(entries.len());
    let mut already_marked: Vec<String> = Vec::new();

    for entry in entries {
        let Some(student_id) = student_id_for_roll(&tx, &entry.roll_number)? else {
            return Err(ApiError::not_found(format!(
                "Student with roll number {} not found",
                entry.roll_number
            )));
        };
        if marked_on(&tx, &student_id, &day)? {
            already_marked.push(entry.roll_number.clone());
            continue;
        }

        let id = Uuid::new_v4().to_string();
        let inserted = tx.execute(
            "INSERT INTO attendance(id, student_id, roll_number, status, day, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &id,
                &student_id,
                &entry.roll_number,
                entry.status.as_str(),
                &day,
                created_at,
            ),
        );
        match inserted {
            Ok(_) => records.push(json!({
                "_id": id,
                "studentId": student_id,
                "rollNumber": entry.roll_number,
                "status": entry.status.as_str(),
                "createdAt": millis_to_rfc3339(created_at),
            })),
            // Lost a race with a concurrent batch for the same student.
            Err(e) if db::unique_violation(&e).is_some() => {
                already_marked.push(entry.roll_number.clone());
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !already_marked.is_empty() {
        return Err(
            ApiError::conflict("Attendance already marked for students")
                .with_details(json!({ "alreadyMarkedRollNumbers": already_marked })),
        );
    }

    tx.commit()
        .map_err(|e| ApiError::internal("db_commit_failed", e))?;
    Ok(records)
}

async fn handle_mark_attendance(
    State(state): State<AppState>,
    Authorized { user, .. }: Authorized<TeacherOnly>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let params = json_body(body)?;
    let entries = parse_attendance_data(&params)?;

    let records = {
        let conn = state.conn()?;
        mark_attendance(&conn, &entries, Local::now())
    };
    match &records {
        Ok(r) => tracing::info!(teacher_id = %user.id, marked = r.len(), "attendance recorded"),
        Err(e) => tracing::info!(teacher_id = %user.id, rejected = %e, "attendance batch rejected"),
    }
    let records = records?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Attendance marked successfully",
            "attendanceRecords": records,
        })),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/attendance", post(handle_mark_attendance))
}
