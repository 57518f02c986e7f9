//! Attendance session persistence
//!
//! Creation surfaces uniqueness violations distinctly (callers of the
//! materializer absorb them as success). Roster read-modify-write goes
//! through a compare-and-swap on the `version` column so concurrent
//! reconciliation attempts cannot interleave partial updates.

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_common::models::{
    AttendanceCounts, AttendanceSession, AttendanceStatus, RosterEntry, Student,
};
use rollcall_common::{Error, Result, SlotTime};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

/// One pending status change produced by reconciliation
#[derive(Debug, Clone)]
pub struct RosterUpdate {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
}

fn session_from_row(row: &SqliteRow) -> Result<AttendanceSession> {
    let date: String = row.get("date");
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("failed to parse session date: {}", e)))?;
    let start_time: String = row.get("start_time");
    let end_time: String = row.get("end_time");
    let locked_at: Option<String> = row.get("locked_at");
    let locked_at = locked_at
        .map(|s| parse_timestamp(&s, "locked_at"))
        .transpose()?;

    Ok(AttendanceSession {
        id: parse_uuid(&row.get::<String, _>("id"), "attendance_sessions.id")?,
        section_id: parse_uuid(&row.get::<String, _>("section_id"), "section_id")?,
        course_id: parse_uuid(&row.get::<String, _>("course_id"), "course_id")?,
        marked_by: parse_uuid(&row.get::<String, _>("marked_by"), "marked_by")?,
        date,
        start_time: start_time.parse::<SlotTime>()?,
        end_time: end_time.parse::<SlotTime>()?,
        room: row.get("room"),
        is_extra: row.get::<i64, _>("is_extra") != 0,
        locked: row.get::<i64, _>("locked") != 0,
        locked_at,
        lock_deadline: parse_timestamp(&row.get::<String, _>("lock_deadline"), "lock_deadline")?,
        version: row.get("version"),
        present_count: row.get("present_count"),
        absent_count: row.get("absent_count"),
        not_considered_count: row.get("not_considered_count"),
        percentage: row.get("percentage"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
    })
}

const SESSION_COLUMNS: &str = "id, section_id, course_id, marked_by, date, start_time, end_time,
     room, is_extra, locked, locked_at, lock_deadline, version,
     present_count, absent_count, not_considered_count, percentage, created_at";

/// Insert a session plus its roster snapshot in one transaction.
///
/// A `(section, date, start_time)` uniqueness violation is returned as-is;
/// use [`Error::is_unique_violation`] to distinguish it.
pub async fn insert_session(
    pool: &SqlitePool,
    session: &AttendanceSession,
    roster: &[Student],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO attendance_sessions
            (id, section_id, course_id, marked_by, date, start_time, end_time,
             room, is_extra, locked, locked_at, lock_deadline, version,
             present_count, absent_count, not_considered_count, percentage, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, 0, 0, ?, 0, 0, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.section_id.to_string())
    .bind(session.course_id.to_string())
    .bind(session.marked_by.to_string())
    .bind(session.date.format("%Y-%m-%d").to_string())
    .bind(session.start_time.to_string())
    .bind(session.end_time.to_string())
    .bind(&session.room)
    .bind(session.is_extra as i64)
    .bind(session.lock_deadline.to_rfc3339())
    .bind(roster.len() as i64)
    .bind(session.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for student in roster {
        sqlx::query(
            r#"
            INSERT INTO session_roster (session_id, student_id, student_name, reg_no, status)
            VALUES (?, ?, ?, ?, 'absent')
            "#,
        )
        .bind(session.id.to_string())
        .bind(student.id.to_string())
        .bind(&student.name)
        .bind(&student.reg_no)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Look up a session by its derived unique key
pub async fn find_by_key(
    pool: &SqlitePool,
    section_id: Uuid,
    date: NaiveDate,
    start_time: SlotTime,
) -> Result<Option<AttendanceSession>> {
    let row = sqlx::query(&format!(
        "SELECT {SESSION_COLUMNS} FROM attendance_sessions
         WHERE section_id = ? AND date = ? AND start_time = ?"
    ))
    .bind(section_id.to_string())
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(start_time.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Load a session by id
pub async fn get_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<AttendanceSession>> {
    let row = sqlx::query(&format!(
        "SELECT {SESSION_COLUMNS} FROM attendance_sessions WHERE id = ?"
    ))
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// All sessions of a section on a date, ordered by start time
pub async fn list_for_date(
    pool: &SqlitePool,
    section_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AttendanceSession>> {
    let rows = sqlx::query(&format!(
        "SELECT {SESSION_COLUMNS} FROM attendance_sessions
         WHERE section_id = ? AND date = ? ORDER BY start_time"
    ))
    .bind(section_id.to_string())
    .bind(date.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Roster snapshot of a session, in enrollment order
pub async fn load_roster(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<RosterEntry>> {
    let rows = sqlx::query(
        "SELECT session_id, student_id, student_name, reg_no, status,
                marked_at, confidence, remarks
         FROM session_roster WHERE session_id = ? ORDER BY rowid",
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let status: String = row.get("status");
            let marked_at: Option<String> = row.get("marked_at");
            let marked_at = marked_at
                .map(|s| parse_timestamp(&s, "marked_at"))
                .transpose()?;
            Ok(RosterEntry {
                session_id: parse_uuid(&row.get::<String, _>("session_id"), "session_id")?,
                student_id: parse_uuid(&row.get::<String, _>("student_id"), "student_id")?,
                student_name: row.get("student_name"),
                reg_no: row.get("reg_no"),
                status: AttendanceStatus::parse(&status)?,
                marked_at,
                confidence: row.get("confidence"),
                remarks: row.get("remarks"),
            })
        })
        .collect()
}

/// Sync room/end_time drift from the timetable onto an existing session.
/// The WHERE clause guards the lock and extra-class invariants even if a
/// writer raced us.
pub async fn sync_schedule_fields(
    pool: &SqlitePool,
    session_id: Uuid,
    room: &str,
    end_time: SlotTime,
) -> Result<()> {
    sqlx::query(
        "UPDATE attendance_sessions SET room = ?, end_time = ?
         WHERE id = ? AND locked = 0 AND is_extra = 0",
    )
    .bind(room)
    .bind(end_time.to_string())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Force a session into the Locked state
pub async fn mark_locked(pool: &SqlitePool, session_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE attendance_sessions SET locked = 1, locked_at = ? WHERE id = ? AND locked = 0",
    )
    .bind(now.to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Reopen a locked session, stamping a fresh lock deadline
pub async fn mark_unlocked(
    pool: &SqlitePool,
    session_id: Uuid,
    new_deadline: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE attendance_sessions
         SET locked = 0, locked_at = NULL, lock_deadline = ?
         WHERE id = ?",
    )
    .bind(new_deadline.to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Earliest booking in `room` on `date` overlapping `[start, end)`.
///
/// Zero-padded "HH:MM" strings compare chronologically, so the half-open
/// overlap test runs directly in SQL.
pub async fn find_room_clash(
    pool: &SqlitePool,
    room: &str,
    date: NaiveDate,
    start: SlotTime,
    end: SlotTime,
) -> Result<Option<AttendanceSession>> {
    let row = sqlx::query(&format!(
        "SELECT {SESSION_COLUMNS} FROM attendance_sessions
         WHERE room = ? AND date = ? AND start_time < ? AND end_time > ?
         ORDER BY start_time LIMIT 1"
    ))
    .bind(room)
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(end.to_string())
    .bind(start.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Apply a reconciliation outcome atomically.
///
/// The version compare-and-swap serializes writers per session: if another
/// reconciliation (or unlock) committed since `expected_version` was read,
/// nothing is written and the caller gets a `VersionConflict` to retry
/// against refreshed state.
pub async fn apply_reconciliation(
    pool: &SqlitePool,
    session_id: Uuid,
    expected_version: i64,
    updates: &[RosterUpdate],
    counts: AttendanceCounts,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE attendance_sessions
        SET version = version + 1,
            locked = 1,
            locked_at = ?,
            present_count = ?,
            absent_count = ?,
            not_considered_count = ?,
            percentage = ?
        WHERE id = ? AND version = ? AND locked = 0
        "#,
    )
    .bind(now.to_rfc3339())
    .bind(counts.present)
    .bind(counts.absent)
    .bind(counts.not_considered)
    .bind(counts.percentage)
    .bind(session_id.to_string())
    .bind(expected_version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(Error::VersionConflict(session_id));
    }

    for update in updates {
        sqlx::query(
            "UPDATE session_roster SET status = ?, marked_at = ?, confidence = ?
             WHERE session_id = ? AND student_id = ?",
        )
        .bind(update.status.as_str())
        .bind(update.marked_at.map(|dt| dt.to_rfc3339()))
        .bind(update.confidence)
        .bind(session_id.to_string())
        .bind(update.student_id.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Manual status override for one roster entry, recomputing aggregates
/// from the full roster in the same transaction.
///
/// The transaction opens with a version bump gated on `locked = 0`, so a
/// reconciliation that locked the session after the caller's own lock
/// check cannot have a stale override land on top of it.
pub async fn override_roster_status(
    pool: &SqlitePool,
    session_id: Uuid,
    student_id: Uuid,
    status: AttendanceStatus,
    remarks: Option<String>,
    now: DateTime<Utc>,
) -> Result<AttendanceCounts> {
    let mut tx = pool.begin().await?;

    let guard = sqlx::query(
        "UPDATE attendance_sessions SET version = version + 1
         WHERE id = ? AND locked = 0",
    )
    .bind(session_id.to_string())
    .execute(&mut *tx)
    .await?;

    if guard.rows_affected() == 0 {
        tx.rollback().await?;
        return match get_session(pool, session_id).await? {
            Some(session) => Err(Error::Locked {
                session_id,
                locked_at: session.locked_at,
            }),
            None => Err(Error::NotFound(format!("session {}", session_id))),
        };
    }

    let result = sqlx::query(
        "UPDATE session_roster SET status = ?, marked_at = ?, remarks = ?
         WHERE session_id = ? AND student_id = ?",
    )
    .bind(status.as_str())
    .bind(now.to_rfc3339())
    .bind(&remarks)
    .bind(session_id.to_string())
    .bind(student_id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(Error::NotFound(format!(
            "student {} not on roster of session {}",
            student_id, session_id
        )));
    }

    // Aggregates are derived, recomputed on every save
    let rows = sqlx::query(
        "SELECT status FROM session_roster WHERE session_id = ?",
    )
    .bind(session_id.to_string())
    .fetch_all(&mut *tx)
    .await?;

    let mut present = 0i64;
    let mut absent = 0i64;
    let mut not_considered = 0i64;
    for row in &rows {
        match AttendanceStatus::parse(&row.get::<String, _>("status"))? {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent => absent += 1,
            AttendanceStatus::NotConsidered => not_considered += 1,
        }
    }
    let total = rows.len() as i64;
    let percentage = if total > 0 {
        rollcall_common::models::round_one_decimal(present as f64 / total as f64 * 100.0)
    } else {
        0.0
    };
    let counts = AttendanceCounts {
        present,
        absent,
        not_considered,
        percentage,
    };

    sqlx::query(
        "UPDATE attendance_sessions
         SET present_count = ?, absent_count = ?,
             not_considered_count = ?, percentage = ?
         WHERE id = ?",
    )
    .bind(counts.present)
    .bind(counts.absent)
    .bind(counts.not_considered)
    .bind(counts.percentage)
    .bind(session_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(counts)
}

/// Per-course attendance totals for one student across locked sessions
#[derive(Debug, Clone)]
pub struct CourseAttendance {
    pub course_id: Uuid,
    pub total: i64,
    pub present: i64,
}

pub async fn stats_for_student(
    pool: &SqlitePool,
    student_id: Uuid,
) -> Result<Vec<CourseAttendance>> {
    let rows = sqlx::query(
        r#"
        SELECT s.course_id AS course_id,
               COUNT(*) AS total,
               SUM(CASE WHEN r.status = 'present' THEN 1 ELSE 0 END) AS present
        FROM session_roster r
        JOIN attendance_sessions s ON s.id = r.session_id
        WHERE r.student_id = ? AND s.locked = 1 AND r.status != 'not-considered'
        GROUP BY s.course_id
        ORDER BY s.course_id
        "#,
    )
    .bind(student_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(CourseAttendance {
                course_id: parse_uuid(&row.get::<String, _>("course_id"), "course_id")?,
                total: row.get("total"),
                present: row.get("present"),
            })
        })
        .collect()
}
