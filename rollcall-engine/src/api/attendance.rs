//! Face-recognition marking and manual roster overrides

use axum::extract::{Multipart, Path, State};
use axum::Json;
use rollcall_common::models::AttendanceStatus;
use rollcall_common::time::now;
use rollcall_common::Error;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::engine::{lock, reconcile};
use crate::error::ApiResult;
use crate::recognition::{BatchContext, TempImages};
use crate::AppState;

/// POST /api/sessions/:id/mark-face
///
/// Accepts a multipart image batch, submits it to the recognition
/// service, reconciles the result against the roster, and locks the
/// session. If the upstream call fails the roster is untouched and the
/// session stays Open for retry. Uploaded images live in a scratch
/// directory that is removed on every exit path.
pub async fn mark_with_face(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let instant = now();

    // Reject locked/expired sessions before accepting the upload work
    let mut session = db::sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
    lock::ensure_mutable(&state.db, &mut session, instant).await?;

    let mut images = TempImages::new()?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        if images.len() >= state.config.recognition.max_images {
            return Err(Error::InvalidInput(format!(
                "too many images; limit is {}",
                state.config.recognition.max_images
            ))
            .into());
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read upload: {}", e)))?;
        images.add(&file_name, &bytes).await?;
    }

    if images.is_empty() {
        return Err(Error::InvalidInput("no images uploaded".to_string()).into());
    }

    info!(
        session_id = %session_id,
        images = images.len(),
        "Submitting recognition batch"
    );

    let ctx = BatchContext {
        session_id,
        section_id: session.section_id,
    };
    let faces = state.recognition.submit_batch(images.paths(), &ctx).await?;

    let outcome = reconcile::reconcile(&state.db, session_id, &faces, instant).await?;

    let roster: Vec<Value> = outcome
        .roster
        .iter()
        .map(|entry| {
            json!({
                "reg_no": entry.reg_no,
                "name": entry.student_name,
                "status": entry.status,
                "verified": entry
                    .confidence
                    .map(|c| state.recognition.is_verified(c))
                    .unwrap_or(false),
            })
        })
        .collect();

    Ok(Json(json!({
        "session_id": session_id,
        "message": "attendance marked",
        "present_count": outcome.counts.present,
        "absent_count": outcome.counts.absent,
        "percentage": outcome.counts.percentage,
        "total_students": outcome.roster.len(),
        "attendance": roster,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

/// PATCH /api/sessions/:id/roster/:student_id
///
/// Manual status override, including the `not-considered` state the
/// recognition pass must never overwrite. Lock-checked like every other
/// mutation; aggregates are recomputed from the full roster.
pub async fn override_status(
    State(state): State<AppState>,
    Path((session_id, student_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<OverrideRequest>,
) -> ApiResult<Json<Value>> {
    let instant = now();

    let mut session = db::sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
    lock::ensure_mutable(&state.db, &mut session, instant).await?;

    let counts = db::sessions::override_roster_status(
        &state.db,
        session_id,
        student_id,
        request.status,
        request.remarks,
        instant,
    )
    .await?;

    Ok(Json(json!({
        "session_id": session_id,
        "student_id": student_id,
        "status": request.status,
        "present_count": counts.present,
        "absent_count": counts.absent,
        "not_considered_count": counts.not_considered,
        "percentage": counts.percentage,
    })))
}
