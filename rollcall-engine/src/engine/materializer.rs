//! Session materialization
//!
//! Turns a section's weekly timetable into concrete dated sessions,
//! idempotently. Concurrent callers racing on the same slot occurrence are
//! resolved by the storage-layer unique key on
//! `(section, date, start_time)`: the loser absorbs the uniqueness
//! violation and returns the winner's row. There is no application-level
//! locking.

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_common::config::EngineConfig;
use rollcall_common::error::Clash;
use rollcall_common::models::AttendanceSession;
use rollcall_common::time::weekday_name;
use rollcall_common::{Error, Result, SlotTime};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::engine::conflict;

/// Materialize all sessions a section should have on `date`.
///
/// For each timetable slot meeting that weekday:
/// - missing session → created with a roster snapshot of the current
///   enrollment, all entries `absent`, state Open;
/// - existing unlocked recurring session → room/end-time drift from the
///   timetable is synced in place;
/// - deadline-expired Open session → flipped to Locked, drift discarded;
/// - locked or ad-hoc sessions → never touched.
pub async fn ensure_sessions_for(
    pool: &SqlitePool,
    config: &EngineConfig,
    section_id: Uuid,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<AttendanceSession>> {
    let section = db::sections::get_section(pool, section_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("section {}", section_id)))?;

    let day = weekday_name(date);
    let slots = db::sections::list_slots(pool, section_id).await?;
    let mut sessions = Vec::new();

    for slot in slots.iter().filter(|s| s.meets_on(day)) {
        match db::sessions::find_by_key(pool, section_id, date, slot.start_time).await? {
            Some(mut session) => {
                // Past the lock deadline the session expires; it must not
                // absorb timetable drift on its way out.
                if !session.locked && now > session.lock_deadline {
                    info!(
                        session_id = %session.id,
                        deadline = %session.lock_deadline,
                        "Lock deadline passed; forcing session Locked"
                    );
                    db::sessions::mark_locked(pool, session.id, now).await?;
                    session.locked = true;
                    session.locked_at = Some(now);
                }

                let drifted =
                    session.room != section.room || session.end_time != slot.end_time;
                if drifted && !session.locked && !session.is_extra {
                    debug!(
                        session_id = %session.id,
                        room = %section.room,
                        end_time = %slot.end_time,
                        "Syncing schedule drift onto existing session"
                    );
                    db::sessions::sync_schedule_fields(
                        pool,
                        session.id,
                        &section.room,
                        slot.end_time,
                    )
                    .await?;
                    session.room = section.room.clone();
                    session.end_time = slot.end_time;
                }
                sessions.push(session);
            }
            None => {
                let roster = db::sections::list_enrolled(pool, section_id).await?;
                let session = AttendanceSession::new(
                    &section,
                    section.teacher_id,
                    date,
                    slot.start_time,
                    slot.end_time,
                    section.room.clone(),
                    false,
                    now,
                    config.lock_window_hours,
                );

                match db::sessions::insert_session(pool, &session, &roster).await {
                    Ok(()) => {
                        info!(
                            session_id = %session.id,
                            section = %section.name,
                            date = %date,
                            start = %slot.start_time,
                            roster = roster.len(),
                            "Materialized session"
                        );
                        sessions.push(session);
                    }
                    Err(err) if err.is_unique_violation() => {
                        // A concurrent materializer won the race; their row
                        // is the session. Not an error.
                        debug!(
                            section_id = %section_id,
                            date = %date,
                            start = %slot.start_time,
                            "Duplicate materialization absorbed"
                        );
                        let existing =
                            db::sessions::find_by_key(pool, section_id, date, slot.start_time)
                                .await?
                                .ok_or_else(|| {
                                    Error::Internal(
                                        "session vanished after duplicate-key race".to_string(),
                                    )
                                })?;
                        sessions.push(existing);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }

    Ok(sessions)
}

/// Create ad-hoc (extra-class) sessions for a list of start times.
///
/// Each slot's end time is start + the configured class duration; slots
/// that would cross midnight are rejected. All requested slots are
/// conflict-checked against existing bookings in the section's room and
/// against each other before anything is created, so a clash on any slot
/// leaves no partial state. Created sessions are flagged extra and never
/// auto-synced afterwards.
pub async fn create_ad_hoc_sessions(
    pool: &SqlitePool,
    config: &EngineConfig,
    section_id: Uuid,
    date: NaiveDate,
    time_slots: &[SlotTime],
    now: DateTime<Utc>,
) -> Result<Vec<AttendanceSession>> {
    if time_slots.is_empty() {
        return Err(Error::InvalidInput(
            "at least one time slot is required".to_string(),
        ));
    }

    let section = db::sections::get_section(pool, section_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("section {}", section_id)))?;

    // Validate every slot before creating any. Requested slots are checked
    // against each other as well as against existing bookings; a request
    // may not smuggle in its own overlap.
    let mut planned: Vec<(SlotTime, SlotTime)> = Vec::with_capacity(time_slots.len());
    for &start in time_slots {
        let end = start.add_minutes(config.slot_minutes);
        if end <= start {
            return Err(Error::InvalidInput(format!(
                "slot starting at {} would cross midnight",
                start
            )));
        }
        if let Some(&(other_start, other_end)) = planned
            .iter()
            .find(|(s, e)| conflict::overlaps(*s, *e, start, end))
        {
            return Err(Error::Conflict(Clash {
                session_id: None,
                room: Some(section.room.clone()),
                day: None,
                start_time: other_start.to_string(),
                end_time: other_end.to_string(),
            }));
        }
        if let Some(existing) =
            db::sessions::find_room_clash(pool, &section.room, date, start, end).await?
        {
            return Err(Error::Conflict(Clash {
                session_id: Some(existing.id),
                room: Some(existing.room.clone()),
                day: None,
                start_time: existing.start_time.to_string(),
                end_time: existing.end_time.to_string(),
            }));
        }
        planned.push((start, end));
    }

    let roster = db::sections::list_enrolled(pool, section_id).await?;
    let mut created = Vec::with_capacity(planned.len());

    for (start, end) in planned {
        let session = AttendanceSession::new(
            &section,
            section.teacher_id,
            date,
            start,
            end,
            section.room.clone(),
            true,
            now,
            config.lock_window_hours,
        );

        match db::sessions::insert_session(pool, &session, &roster).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    section = %section.name,
                    date = %date,
                    start = %start,
                    "Created ad-hoc session"
                );
                created.push(session);
            }
            Err(err) if err.is_unique_violation() => {
                // Same section + start already materialized between the
                // conflict check and the insert; surface as a clash.
                let existing = db::sessions::find_by_key(pool, section_id, date, start).await?;
                return Err(Error::Conflict(Clash {
                    session_id: existing.as_ref().map(|s| s.id),
                    room: Some(section.room.clone()),
                    day: None,
                    start_time: start.to_string(),
                    end_time: end.to_string(),
                }));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(created)
}
