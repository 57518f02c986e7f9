//! Database connection and schema setup
//!
//! SQLite via sqlx. The schema is created idempotently at startup; the
//! `(section_id, date, start_time)` unique index on `attendance_sessions`
//! is load-bearing: it is the sole mechanism that resolves concurrent
//! materialization races.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Open (creating if missing) the database at `path`
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(crate::Error::Database)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Connected to database at {}", path.display());
    Ok(pool)
}

/// In-memory pool for tests. Single connection so every query sees the
/// same database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Create all tables and indexes if they do not exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            course_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            room TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS section_slots (
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES sections(id),
            days TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            reg_no TEXT NOT NULL UNIQUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS section_students (
            section_id TEXT NOT NULL REFERENCES sections(id),
            student_id TEXT NOT NULL REFERENCES students(id),
            UNIQUE(section_id, student_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS attendance_sessions (
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES sections(id),
            course_id TEXT NOT NULL,
            marked_by TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            room TEXT NOT NULL,
            is_extra INTEGER NOT NULL DEFAULT 0,
            locked INTEGER NOT NULL DEFAULT 0,
            locked_at TEXT,
            lock_deadline TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            present_count INTEGER NOT NULL DEFAULT 0,
            absent_count INTEGER NOT NULL DEFAULT 0,
            not_considered_count INTEGER NOT NULL DEFAULT 0,
            percentage REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
        // One session per slot occurrence; concurrent materializers rely
        // on this index and absorb violations as success.
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_unique_occurrence
            ON attendance_sessions(section_id, date, start_time)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_sessions_room_date
            ON attendance_sessions(room, date)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS session_roster (
            session_id TEXT NOT NULL REFERENCES attendance_sessions(id),
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            reg_no TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'absent',
            marked_at TEXT,
            confidence REAL,
            remarks TEXT,
            UNIQUE(session_id, student_id)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_roster_student
            ON session_roster(student_id)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
