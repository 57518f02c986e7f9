//! Scheduling conflict detection
//!
//! Two bookings conflict iff they share a scoping key (room for ad-hoc
//! sessions, section + weekday for permanent slots) and their half-open
//! `[start, end)` intervals overlap. Back-to-back bookings never conflict.

use rollcall_common::error::Clash;
use rollcall_common::models::Slot;
use rollcall_common::SlotTime;

/// Half-open interval overlap: `[a_start, a_end)` vs `[b_start, b_end)`
pub fn overlaps(a_start: SlotTime, a_end: SlotTime, b_start: SlotTime, b_end: SlotTime) -> bool {
    a_start < b_end && a_end > b_start
}

/// Check a candidate weekly slot against a section's existing slots.
///
/// Scope is section + shared weekday: two slots only clash when at least
/// one weekday appears in both day-sets.
pub fn find_slot_clash(
    existing: &[Slot],
    days: &[String],
    start: SlotTime,
    end: SlotTime,
) -> Option<Clash> {
    for slot in existing {
        let shared_day = days.iter().find(|day| slot.meets_on(day));
        if let Some(day) = shared_day {
            if overlaps(slot.start_time, slot.end_time, start, end) {
                return Some(Clash {
                    session_id: None,
                    room: None,
                    day: Some(day.clone()),
                    start_time: slot.start_time.to_string(),
                    end_time: slot.end_time.to_string(),
                });
            }
        }
    }
    None
}

/// True if the section already has a slot with this exact day + start;
/// duplicate permanent-slot requests are skipped rather than rejected.
pub fn is_duplicate_slot(existing: &[Slot], day: &str, start: SlotTime) -> bool {
    existing
        .iter()
        .any(|slot| slot.meets_on(day) && slot.start_time == start)
}
