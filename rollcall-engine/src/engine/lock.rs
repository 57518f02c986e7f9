//! Session lock state machine
//!
//! `Open → Locked`, reversible only through an explicit unlock. Every
//! mutation path calls [`ensure_mutable`] first; a session whose deadline
//! has passed is flipped to Locked as a side effect of the attempted
//! mutation before the rejection is returned. Reads never consult the lock.

use chrono::{DateTime, Duration, Utc};
use rollcall_common::models::AttendanceSession;
use rollcall_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db;

/// Reject with `Locked` if the session no longer accepts mutation.
///
/// Passive expiry: if the lock deadline has passed on a still-Open
/// session, the Locked state is persisted here before rejecting.
pub async fn ensure_mutable(
    pool: &SqlitePool,
    session: &mut AttendanceSession,
    now: DateTime<Utc>,
) -> Result<()> {
    if session.locked {
        return Err(Error::Locked {
            session_id: session.id,
            locked_at: session.locked_at,
        });
    }

    if now > session.lock_deadline {
        info!(
            session_id = %session.id,
            deadline = %session.lock_deadline,
            "Lock deadline passed; forcing session Locked"
        );
        db::sessions::mark_locked(pool, session.id, now).await?;
        session.locked = true;
        session.locked_at = Some(now);
        return Err(Error::Locked {
            session_id: session.id,
            locked_at: session.locked_at,
        });
    }

    Ok(())
}

/// Explicit lock request
pub async fn lock_session(pool: &SqlitePool, session_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    let session = db::sessions::get_session(pool, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

    if !session.locked {
        db::sessions::mark_locked(pool, session_id, now).await?;
        info!(session_id = %session_id, "Session locked");
    }
    Ok(())
}

/// Explicit unlock by an authorized actor; the only path back to Open.
/// A fresh lock deadline is stamped so the reopened session does not
/// immediately expire again.
pub async fn unlock_session(
    pool: &SqlitePool,
    session_id: Uuid,
    now: DateTime<Utc>,
    lock_window_hours: i64,
) -> Result<()> {
    let session = db::sessions::get_session(pool, session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

    if session.locked {
        let deadline = now + Duration::hours(lock_window_hours);
        db::sessions::mark_unlocked(pool, session_id, deadline).await?;
        info!(session_id = %session_id, new_deadline = %deadline, "Session unlocked");
    }
    Ok(())
}
