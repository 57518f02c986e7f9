//! Roster reconciliation
//!
//! Applies a recognition batch to a session roster: match each roster
//! entry against the recognized identities, mark present/absent,
//! recompute the derived counts, and finish by locking the session.
//!
//! Matching prefers the stable registration number when the service
//! supplies one. Normalized display-name matching is kept as a fallback
//! for older service versions that only return labels; near-duplicate
//! names can collide there, which is why it is the fallback and not the
//! primary key.

use chrono::{DateTime, Utc};
use rollcall_common::models::{
    AttendanceCounts, AttendanceStatus, RecognizedFace, RosterEntry,
};
use rollcall_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::db::sessions::RosterUpdate;
use crate::engine::lock;

/// Result of one reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub session_id: Uuid,
    pub counts: AttendanceCounts,
    pub roster: Vec<RosterEntry>,
}

/// Lower-cased, trimmed identity key
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Decide the post-reconciliation status of every roster entry.
///
/// Pure: no storage access. `not-considered` entries (administrative
/// override) are never overwritten by the recognition pass. Returns the
/// status updates to persist alongside the finalized roster view.
pub fn plan_updates(
    roster: &[RosterEntry],
    results: &[RecognizedFace],
    now: DateTime<Utc>,
) -> (Vec<RosterUpdate>, Vec<RosterEntry>) {
    // Confidence keyed by stable id and by normalized name
    let mut by_reg_no: HashMap<String, f64> = HashMap::new();
    let mut by_name: HashMap<String, f64> = HashMap::new();
    for face in results {
        if let Some(reg_no) = &face.reg_no {
            let key = normalize_identity(reg_no);
            if !key.is_empty() {
                let slot = by_reg_no.entry(key).or_insert(face.confidence);
                *slot = slot.max(face.confidence);
            }
        }
        if let Some(name) = &face.name {
            let key = normalize_identity(name);
            if !key.is_empty() {
                let slot = by_name.entry(key).or_insert(face.confidence);
                *slot = slot.max(face.confidence);
            }
        }
    }

    let mut updates = Vec::new();
    let mut finalized = Vec::new();

    for entry in roster {
        if entry.status == AttendanceStatus::NotConsidered {
            finalized.push(entry.clone());
            continue;
        }

        let matched = by_reg_no
            .get(&normalize_identity(&entry.reg_no))
            .or_else(|| by_name.get(&normalize_identity(&entry.student_name)))
            .copied();

        let mut updated = entry.clone();
        match matched {
            Some(confidence) => {
                updated.status = AttendanceStatus::Present;
                updated.marked_at = Some(now);
                updated.confidence = Some(confidence);
            }
            None => {
                updated.status = AttendanceStatus::Absent;
                updated.marked_at = None;
                updated.confidence = None;
            }
        }

        updates.push(RosterUpdate {
            student_id: updated.student_id,
            status: updated.status,
            marked_at: updated.marked_at,
            confidence: updated.confidence,
        });
        finalized.push(updated);
    }

    (updates, finalized)
}

/// Run reconciliation for one session.
///
/// Rejects locked or deadline-expired sessions (delegating passive expiry
/// to the lock state machine), then writes all roster updates, the
/// recomputed aggregates, and the Locked transition in one atomic step.
/// A concurrent writer makes the whole run fail with no partial update.
pub async fn reconcile(
    pool: &SqlitePool,
    session_id: Uuid,
    results: &[RecognizedFace],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    let mut session = db::sessions::get_session(pool, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

    lock::ensure_mutable(pool, &mut session, now).await?;

    let roster = db::sessions::load_roster(pool, session_id).await?;
    let (updates, finalized) = plan_updates(&roster, results, now);
    let counts = AttendanceCounts::from_roster(&finalized);

    db::sessions::apply_reconciliation(
        pool,
        session_id,
        session.version,
        &updates,
        counts,
        now,
    )
    .await?;

    info!(
        session_id = %session_id,
        present = counts.present,
        absent = counts.absent,
        not_considered = counts.not_considered,
        percentage = counts.percentage,
        "Reconciliation complete; session locked"
    );

    Ok(ReconcileOutcome {
        session_id,
        counts,
        roster: finalized,
    })
}
