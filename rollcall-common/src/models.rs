//! Domain models shared across the rollcall services

use crate::time::SlotTime;
use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical weekday names used in slot day-sets
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Validate a weekday name against the canonical list
pub fn validate_weekday(day: &str) -> Result<()> {
    if WEEKDAYS.contains(&day) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("unknown weekday: {:?}", day)))
    }
}

/// A recurring teaching assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub name: String,
    pub course_id: Uuid,
    pub teacher_id: Uuid,
    /// Assigned room, inherited by materialized sessions
    pub room: String,
}

/// One recurring weekly time window belonging to a section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub section_id: Uuid,
    /// Weekday names this slot recurs on
    pub days: Vec<String>,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
}

impl Slot {
    pub fn meets_on(&self, day: &str) -> bool {
        self.days.iter().any(|d| d == day)
    }
}

/// An enrolled student (snapshot fields carried onto rosters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub reg_no: String,
}

/// Per-student presence status within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    Absent,
    Present,
    NotConsidered,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Present => "present",
            AttendanceStatus::NotConsidered => "not-considered",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "absent" => Ok(AttendanceStatus::Absent),
            "present" => Ok(AttendanceStatus::Present),
            "not-considered" => Ok(AttendanceStatus::NotConsidered),
            other => Err(Error::InvalidInput(format!(
                "unknown attendance status: {:?}",
                other
            ))),
        }
    }
}

/// Whether a session still accepts roster mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Open,
    Locked,
}

/// One roster line: a snapshot of the student plus their status.
///
/// The snapshot is a copy taken at session creation; later edits to the
/// section enrollment do not retroactively alter past sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub reg_no: String,
    pub status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
    pub remarks: Option<String>,
}

/// Aggregate counts derived from a roster. Never independently settable;
/// recomputed on every save.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttendanceCounts {
    pub present: i64,
    pub absent: i64,
    pub not_considered: i64,
    /// present / total * 100, rounded to one decimal
    pub percentage: f64,
}

impl AttendanceCounts {
    pub fn from_roster(roster: &[RosterEntry]) -> Self {
        let present = roster
            .iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .count() as i64;
        let absent = roster
            .iter()
            .filter(|r| r.status == AttendanceStatus::Absent)
            .count() as i64;
        let not_considered = roster
            .iter()
            .filter(|r| r.status == AttendanceStatus::NotConsidered)
            .count() as i64;
        let total = roster.len() as i64;
        let percentage = if total > 0 {
            round_one_decimal(present as f64 / total as f64 * 100.0)
        } else {
            0.0
        };
        Self {
            present,
            absent,
            not_considered,
            percentage,
        }
    }
}

/// Round to one decimal place
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A materialized, dated instance of one slot occurrence.
///
/// `(section_id, date, start_time)` is unique across all sessions; the
/// storage layer enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub section_id: Uuid,
    pub course_id: Uuid,
    /// Teacher responsible for marking this session
    pub marked_by: Uuid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub room: String,
    /// Ad-hoc/extra sessions are never auto-synced against the timetable
    pub is_extra: bool,
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    /// Absolute instant after which the session is forced Locked
    pub lock_deadline: DateTime<Utc>,
    /// Optimistic concurrency counter for roster read-modify-write
    pub version: i64,
    pub present_count: i64,
    pub absent_count: i64,
    pub not_considered_count: i64,
    pub percentage: f64,
    pub created_at: DateTime<Utc>,
}

impl AttendanceSession {
    /// Construct a fresh Open session for a slot occurrence
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        section: &Section,
        marked_by: Uuid,
        date: NaiveDate,
        start_time: SlotTime,
        end_time: SlotTime,
        room: String,
        is_extra: bool,
        now: DateTime<Utc>,
        lock_window_hours: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            section_id: section.id,
            course_id: section.course_id,
            marked_by,
            date,
            start_time,
            end_time,
            room,
            is_extra,
            locked: false,
            locked_at: None,
            lock_deadline: now + Duration::hours(lock_window_hours),
            version: 0,
            present_count: 0,
            absent_count: 0,
            not_considered_count: 0,
            percentage: 0.0,
            created_at: now,
        }
    }

    pub fn lock_state(&self) -> LockState {
        if self.locked {
            LockState::Locked
        } else {
            LockState::Open
        }
    }
}

/// One identity returned by the recognition service for a batch,
/// normalized from whatever shape the service responded with.
/// Transient; never persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFace {
    /// Stable student identifier, when the service supplies one.
    /// Preferred matching key.
    pub reg_no: Option<String>,
    /// Display-name label. Deprecated fallback matching key.
    pub name: Option<String>,
    pub confidence: f64,
    pub bbox: Option<Vec<f64>>,
}
