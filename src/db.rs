use rusqlite::{Connection, ErrorCode};
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('student', 'teacher')),
            roll_number TEXT,
            auth_number TEXT UNIQUE,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    // Roll numbers are the attendance lookup key, so they must resolve to one student.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_student_roll
         ON users(roll_number) WHERE role = 'student'",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'absent')),
            day TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(student_id, day)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_day ON attendance(day)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            message TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            start_time INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_expires_at ON messages(expires_at)",
        [],
    )?;

    Ok(conn)
}

/// Returns the constraint message (e.g. `UNIQUE constraint failed: users.email`)
/// when `e` is a uniqueness violation.
pub fn unique_violation(e: &rusqlite::Error) -> Option<&str> {
    match e {
        rusqlite::Error::SqliteFailure(code, msg) if code.code == ErrorCode::ConstraintViolation => {
            let msg = msg.as_deref().unwrap_or("");
            if msg.starts_with("UNIQUE") {
                Some(msg)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn open_db_is_idempotent() {
        let ws = temp_workspace("attendd-db-open");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('users', 'attendance', 'messages')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn unique_violation_detects_duplicate_email() {
        let ws = temp_workspace("attendd-db-unique");
        let conn = open_db(&ws).unwrap();
        let insert = "INSERT INTO users(id, name, email, password_hash, role, created_at)
                      VALUES(?, 'n', 'a@x.com', 'h', 'teacher', 0)";
        conn.execute(insert, ["u1"]).unwrap();
        let e = conn.execute(insert, ["u2"]).unwrap_err();
        let msg = unique_violation(&e).expect("unique violation");
        assert!(msg.contains("users.email"), "{}", msg);
    }
}
