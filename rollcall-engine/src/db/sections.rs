//! Section, slot, and enrollment queries

use rollcall_common::models::{Section, Slot, Student};
use rollcall_common::{Error, Result, SlotTime};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

/// Load a section by id
pub async fn get_section(pool: &SqlitePool, section_id: Uuid) -> Result<Option<Section>> {
    let row = sqlx::query(
        "SELECT id, name, course_id, teacher_id, room FROM sections WHERE id = ?",
    )
    .bind(section_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(Section {
            id: parse_uuid(&row.get::<String, _>("id"), "sections.id")?,
            name: row.get("name"),
            course_id: parse_uuid(&row.get::<String, _>("course_id"), "sections.course_id")?,
            teacher_id: parse_uuid(&row.get::<String, _>("teacher_id"), "sections.teacher_id")?,
            room: row.get("room"),
        })
    })
    .transpose()
}

/// Weekly slots for a section, in insertion order
pub async fn list_slots(pool: &SqlitePool, section_id: Uuid) -> Result<Vec<Slot>> {
    let rows = sqlx::query(
        "SELECT id, section_id, days, start_time, end_time
         FROM section_slots WHERE section_id = ? ORDER BY rowid",
    )
    .bind(section_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let days: String = row.get("days");
            let days: Vec<String> = serde_json::from_str(&days)
                .map_err(|e| Error::Internal(format!("failed to parse slot days: {}", e)))?;
            let start_time: String = row.get("start_time");
            let end_time: String = row.get("end_time");
            Ok(Slot {
                id: parse_uuid(&row.get::<String, _>("id"), "section_slots.id")?,
                section_id: parse_uuid(
                    &row.get::<String, _>("section_id"),
                    "section_slots.section_id",
                )?,
                days,
                start_time: start_time.parse::<SlotTime>()?,
                end_time: end_time.parse::<SlotTime>()?,
            })
        })
        .collect()
}

/// Insert a weekly slot (caller runs conflict detection first)
pub async fn insert_slot(pool: &SqlitePool, slot: &Slot) -> Result<()> {
    let days = serde_json::to_string(&slot.days)
        .map_err(|e| Error::Internal(format!("failed to serialize slot days: {}", e)))?;

    sqlx::query(
        "INSERT INTO section_slots (id, section_id, days, start_time, end_time)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(slot.id.to_string())
    .bind(slot.section_id.to_string())
    .bind(days)
    .bind(slot.start_time.to_string())
    .bind(slot.end_time.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Enrolled students of a section, in enrollment order
pub async fn list_enrolled(pool: &SqlitePool, section_id: Uuid) -> Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT s.id, s.name, s.reg_no
         FROM section_students ss
         JOIN students s ON s.id = ss.student_id
         WHERE ss.section_id = ?
         ORDER BY ss.rowid",
    )
    .bind(section_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Student {
                id: parse_uuid(&row.get::<String, _>("id"), "students.id")?,
                name: row.get("name"),
                reg_no: row.get("reg_no"),
            })
        })
        .collect()
}

/// Insert a section (CRUD surface lives elsewhere; used by seeding and tests)
pub async fn insert_section(pool: &SqlitePool, section: &Section) -> Result<()> {
    sqlx::query("INSERT INTO sections (id, name, course_id, teacher_id, room) VALUES (?, ?, ?, ?, ?)")
        .bind(section.id.to_string())
        .bind(&section.name)
        .bind(section.course_id.to_string())
        .bind(section.teacher_id.to_string())
        .bind(&section.room)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert a student record
pub async fn insert_student(pool: &SqlitePool, student: &Student) -> Result<()> {
    sqlx::query("INSERT INTO students (id, name, reg_no) VALUES (?, ?, ?)")
        .bind(student.id.to_string())
        .bind(&student.name)
        .bind(&student.reg_no)
        .execute(pool)
        .await?;
    Ok(())
}

/// Enroll a student into a section
pub async fn enroll(pool: &SqlitePool, section_id: Uuid, student_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO section_students (section_id, student_id) VALUES (?, ?)")
        .bind(section_id.to_string())
        .bind(student_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
