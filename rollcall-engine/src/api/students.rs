//! Per-student attendance statistics

use axum::extract::{Path, State};
use axum::Json;
use rollcall_common::models::round_one_decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::error::ApiResult;
use crate::AppState;

/// Attendance below this percentage is flagged
const SAFE_THRESHOLD: f64 = 75.0;

/// GET /api/students/:id/attendance
///
/// Aggregates locked sessions per course. `not-considered` entries are
/// excluded from both numerator and denominator.
pub async fn attendance_stats(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let stats = db::sessions::stats_for_student(&state.db, student_id).await?;

    let report: Vec<Value> = stats
        .iter()
        .map(|course| {
            let percentage = if course.total > 0 {
                round_one_decimal(course.present as f64 / course.total as f64 * 100.0)
            } else {
                0.0
            };
            json!({
                "course_id": course.course_id,
                "total_classes": course.total,
                "present_count": course.present,
                "absent_count": course.total - course.present,
                "percentage": percentage,
                "standing": if percentage >= SAFE_THRESHOLD { "Safe" } else { "Low Attendance" },
            })
        })
        .collect();

    Ok(Json(json!({
        "student_id": student_id,
        "total_courses": report.len(),
        "courses": report,
    })))
}
