//! Session materialization, details, and lock endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rollcall_common::models::{AttendanceSession, LockState, RosterEntry};
use rollcall_common::time::{local_date, now};
use rollcall_common::{Error, SlotTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::engine::{lock, materializer};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub section_id: Uuid,
    pub course_id: Uuid,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub room: String,
    pub is_extra: bool,
    pub lock_state: LockState,
    pub total_students: i64,
    pub present_count: i64,
    pub percentage: f64,
}

impl From<&AttendanceSession> for SessionSummary {
    fn from(s: &AttendanceSession) -> Self {
        Self {
            id: s.id,
            section_id: s.section_id,
            course_id: s.course_id,
            date: s.date,
            start_time: s.start_time,
            end_time: s.end_time,
            room: s.room.clone(),
            is_extra: s.is_extra,
            lock_state: s.lock_state(),
            total_students: s.present_count + s.absent_count + s.not_considered_count,
            present_count: s.present_count,
            percentage: s.percentage,
        }
    }
}

/// GET /api/sections/:id/sessions/today
///
/// Materializes any missing sessions for today's timetable, then lists
/// them. "Today" comes from the configured timezone, never the server
/// locale.
pub async fn today_sessions(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let instant = now();
    let today = local_date(instant, state.config.timezone());

    let sessions =
        materializer::ensure_sessions_for(&state.db, &state.config, section_id, today, instant)
            .await?;
    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();

    Ok(Json(json!({
        "date": today,
        "count": summaries.len(),
        "sessions": summaries,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAdHocRequest {
    pub section_id: Uuid,
    pub date: NaiveDate,
    /// Start times, "HH:MM"; end is start + the configured class duration
    pub time_slots: Vec<SlotTime>,
}

/// POST /api/sessions/ad-hoc
///
/// Creates extra-class sessions. A clash on any requested slot rejects
/// the whole request with the colliding booking attached.
pub async fn create_ad_hoc(
    State(state): State<AppState>,
    Json(request): Json<CreateAdHocRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let created = materializer::create_ad_hoc_sessions(
        &state.db,
        &state.config,
        request.section_id,
        request.date,
        &request.time_slots,
        now(),
    )
    .await?;

    let ids: Vec<Uuid> = created.iter().map(|s| s.id).collect();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "created": ids.len(),
            "session_ids": ids,
            "date": request.date,
        })),
    ))
}

#[derive(Debug, Serialize)]
pub struct SessionDetails {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub marked_by: Uuid,
    pub lock_deadline: chrono::DateTime<chrono::Utc>,
    pub roster: Vec<RosterEntry>,
}

/// GET /api/sessions/:id — read access is always permitted, locked or not
pub async fn session_details(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionDetails>> {
    let session = db::sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
    let roster = db::sessions::load_roster(&state.db, session_id).await?;

    Ok(Json(SessionDetails {
        summary: SessionSummary::from(&session),
        marked_by: session.marked_by,
        lock_deadline: session.lock_deadline,
        roster,
    }))
}

/// POST /api/sessions/:id/lock
pub async fn lock(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    lock::lock_session(&state.db, session_id, now()).await?;
    Ok(Json(json!({ "session_id": session_id, "lock_state": "locked" })))
}

/// POST /api/sessions/:id/unlock — authorized-actor path back to Open
pub async fn unlock(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    lock::unlock_session(
        &state.db,
        session_id,
        now(),
        state.config.lock_window_hours,
    )
    .await?;
    Ok(Json(json!({ "session_id": session_id, "lock_state": "open" })))
}
