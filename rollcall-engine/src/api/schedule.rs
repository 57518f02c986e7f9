//! Permanent timetable slot insertion

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rollcall_common::models::{validate_weekday, Slot};
use rollcall_common::{Error, SlotTime};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::engine::conflict;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddSlotRequest {
    /// Weekday names the slot recurs on
    pub days: Vec<String>,
    pub start_time: SlotTime,
    /// Defaults to start + the configured class duration
    pub end_time: Option<SlotTime>,
}

/// POST /api/sections/:id/slots
///
/// Inserts a recurring weekly slot after conflict-checking it against the
/// section's existing slots (section + shared weekday scope). Days that
/// already carry an identical slot are skipped; an overlap on any shared
/// day rejects the whole request.
pub async fn add_slot(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
    Json(request): Json<AddSlotRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if request.days.is_empty() {
        return Err(Error::InvalidInput("provide at least one day".to_string()).into());
    }
    for day in &request.days {
        validate_weekday(day)?;
    }

    let section = db::sections::get_section(&state.db, section_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("section {}", section_id)))?;

    let start = request.start_time;
    let end = request
        .end_time
        .unwrap_or_else(|| start.add_minutes(state.config.slot_minutes));
    if end <= start {
        return Err(Error::InvalidInput("end_time must be after start_time".to_string()).into());
    }

    let existing = db::sections::list_slots(&state.db, section_id).await?;

    // Exact duplicates are a no-op, not a conflict
    let new_days: Vec<String> = request
        .days
        .iter()
        .filter(|day| !conflict::is_duplicate_slot(&existing, day, start))
        .cloned()
        .collect();

    if new_days.is_empty() {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "added": 0,
                "message": format!("slot at {} already exists for all requested days", start),
            })),
        ));
    }

    if let Some(clash) = conflict::find_slot_clash(&existing, &new_days, start, end) {
        return Err(Error::Conflict(clash).into());
    }

    let slot = Slot {
        id: Uuid::new_v4(),
        section_id,
        days: new_days.clone(),
        start_time: start,
        end_time: end,
    };
    db::sections::insert_slot(&state.db, &slot).await?;

    info!(
        section = %section.name,
        days = ?new_days,
        start = %start,
        end = %end,
        "Added permanent slot"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "added": new_days.len(),
            "slot_id": slot.id,
            "days": new_days,
            "start_time": start,
            "end_time": end,
        })),
    ))
}
