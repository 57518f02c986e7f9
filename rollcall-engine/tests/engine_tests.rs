//! End-to-end engine tests against an in-memory database

use chrono::{Duration, NaiveDate, Utc};
use rollcall_common::config::EngineConfig;
use rollcall_common::models::{
    AttendanceCounts, AttendanceStatus, RecognizedFace, Section, Slot, Student,
};
use rollcall_common::{Error, SlotTime};
use rollcall_engine::db;
use rollcall_engine::engine::{lock, materializer, reconcile};
use sqlx::SqlitePool;
use uuid::Uuid;

fn t(s: &str) -> SlotTime {
    s.parse().unwrap()
}

/// 2026-03-02 is a Monday
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

async fn setup() -> (SqlitePool, EngineConfig) {
    let pool = rollcall_common::db::connect_in_memory().await.unwrap();
    rollcall_common::db::init_schema(&pool).await.unwrap();
    (pool, EngineConfig::default())
}

async fn seed_section(
    pool: &SqlitePool,
    name: &str,
    room: &str,
    student_names: &[&str],
    slots: &[(&[&str], &str, &str)],
) -> Section {
    let section = Section {
        id: Uuid::new_v4(),
        name: name.to_string(),
        course_id: Uuid::new_v4(),
        teacher_id: Uuid::new_v4(),
        room: room.to_string(),
    };
    db::sections::insert_section(pool, &section).await.unwrap();

    for (i, student_name) in student_names.iter().enumerate() {
        let student = Student {
            id: Uuid::new_v4(),
            name: student_name.to_string(),
            reg_no: format!("{}-{}", name, i + 1),
        };
        db::sections::insert_student(pool, &student).await.unwrap();
        db::sections::enroll(pool, section.id, student.id)
            .await
            .unwrap();
    }

    for (days, start, end) in slots {
        let slot = Slot {
            id: Uuid::new_v4(),
            section_id: section.id,
            days: days.iter().map(|d| d.to_string()).collect(),
            start_time: t(start),
            end_time: t(end),
        };
        db::sections::insert_slot(pool, &slot).await.unwrap();
    }

    section
}

fn face(name: &str, confidence: f64) -> RecognizedFace {
    RecognizedFace {
        reg_no: None,
        name: Some(name.to_string()),
        confidence,
        bbox: None,
    }
}

#[tokio::test]
async fn materialization_is_idempotent() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-A",
        "201",
        &["Alice", "Bob"],
        &[(&["Monday"], "10:00", "10:50"), (&["Monday"], "11:00", "11:50")],
    )
    .await;
    let now = Utc::now();

    let first = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let second = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    let first_ids: Vec<_> = first.iter().map(|s| s.id).collect();
    let second_ids: Vec<_> = second.iter().map(|s| s.id).collect();
    assert_eq!(first_ids, second_ids);

    // exactly one row per matching slot, no duplicate-key records
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn materialization_skips_non_matching_weekdays() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-B",
        "202",
        &["Alice"],
        &[(&["Tuesday", "Thursday"], "09:00", "09:50")],
    )
    .await;

    let sessions =
        materializer::ensure_sessions_for(&pool, &config, section.id, monday(), Utc::now())
            .await
            .unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn materialization_snapshots_roster_as_absent() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-C",
        "203",
        &["Alice", "Bob", "Carol"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;

    let sessions =
        materializer::ensure_sessions_for(&pool, &config, section.id, monday(), Utc::now())
            .await
            .unwrap();
    let roster = db::sessions::load_roster(&pool, sessions[0].id)
        .await
        .unwrap();

    assert_eq!(roster.len(), 3);
    assert!(roster
        .iter()
        .all(|entry| entry.status == AttendanceStatus::Absent));
    assert_eq!(sessions[0].absent_count, 3);
    assert_eq!(sessions[0].percentage, 0.0);
}

#[tokio::test]
async fn roster_snapshot_ignores_later_enrollment_changes() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-D",
        "204",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;

    let sessions =
        materializer::ensure_sessions_for(&pool, &config, section.id, monday(), Utc::now())
            .await
            .unwrap();

    // enroll another student after the session was created
    let late = Student {
        id: Uuid::new_v4(),
        name: "Zed".to_string(),
        reg_no: "CS-D-99".to_string(),
    };
    db::sections::insert_student(&pool, &late).await.unwrap();
    db::sections::enroll(&pool, section.id, late.id).await.unwrap();

    let again = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), Utc::now())
        .await
        .unwrap();
    let roster = db::sessions::load_roster(&pool, again[0].id).await.unwrap();
    assert_eq!(again[0].id, sessions[0].id);
    assert_eq!(roster.len(), 1, "past snapshot must not grow");
}

#[tokio::test]
async fn schedule_drift_synced_onto_open_sessions_only() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-E",
        "205",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();

    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    // the section moves rooms
    sqlx::query("UPDATE sections SET room = '301' WHERE id = ?")
        .bind(section.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let synced = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    assert_eq!(synced[0].room, "301");

    // once locked, drift no longer touches the session
    lock::lock_session(&pool, session_id, now).await.unwrap();
    sqlx::query("UPDATE sections SET room = '401' WHERE id = ?")
        .bind(section.id.to_string())
        .execute(&pool)
        .await
        .unwrap();
    let frozen = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    assert_eq!(frozen[0].room, "301");
}

#[tokio::test]
async fn ad_hoc_conflict_names_colliding_booking() {
    let (pool, config) = setup().await;
    // Section X: Monday 10:00-10:50 in Room 201
    let section = seed_section(
        &pool,
        "X",
        "201",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    // ad-hoc in the same room at 10:30 overlaps 10:00-10:50
    let err = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("10:30")],
        now,
    )
    .await
    .unwrap_err();

    match err {
        Error::Conflict(clash) => {
            assert_eq!(clash.start_time, "10:00");
            assert_eq!(clash.end_time, "10:50");
            assert_eq!(clash.room.as_deref(), Some("201"));
            assert!(clash.session_id.is_some());
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // atomic failure: nothing was created
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions WHERE is_extra = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn back_to_back_ad_hoc_is_not_a_conflict() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "Y",
        "201",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    // starts exactly when the existing booking ends
    let created = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("10:50")],
        now,
    )
    .await
    .unwrap();

    assert_eq!(created.len(), 1);
    assert!(created[0].is_extra);
    assert_eq!(created[0].end_time, t("11:40")); // 10:50 + 50 min
}

#[tokio::test]
async fn ad_hoc_clash_on_any_slot_creates_nothing() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "Z",
        "210",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    // first requested slot is fine, second clashes
    let err = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("13:00"), t("10:30")],
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions WHERE is_extra = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0, "no partial state on conflict");
}

#[tokio::test]
async fn overlapping_slots_within_one_ad_hoc_request_rejected() {
    let (pool, config) = setup().await;
    let section = seed_section(&pool, "W", "215", &["Alice"], &[]).await;
    let now = Utc::now();

    // 10:00-10:50 and 10:30-11:20 overlap each other; the room itself
    // holds no prior booking
    let err = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("10:00"), t("10:30")],
        now,
    )
    .await
    .unwrap_err();

    match err {
        Error::Conflict(clash) => {
            assert_eq!(clash.start_time, "10:00");
            assert_eq!(clash.end_time, "10:50");
            assert_eq!(clash.room.as_deref(), Some("215"));
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0, "no overlapping bookings may be created");
    assert!(
        db::sessions::find_room_clash(&pool, "215", monday(), t("10:30"), t("11:20"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn ad_hoc_slot_crossing_midnight_rejected() {
    let (pool, config) = setup().await;
    let section = seed_section(&pool, "V", "216", &["Alice"], &[]).await;

    // 23:40 + 50 min would wrap to 00:30, inverting the interval
    let err = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("23:40")],
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn reconciliation_scenario_case_mismatched_names() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-F",
        "206",
        &["Alice", "Bob", "Carol"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    let results = vec![face("alice", 0.93), face(" carol ", 0.87)];
    let outcome = reconcile::reconcile(&pool, session_id, &results, now)
        .await
        .unwrap();

    assert_eq!(outcome.counts.present, 2);
    assert_eq!(outcome.counts.absent, 1);
    assert_eq!(outcome.counts.percentage, 66.7);

    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    let status_of = |name: &str| {
        roster
            .iter()
            .find(|e| e.student_name == name)
            .unwrap()
            .status
    };
    assert_eq!(status_of("Alice"), AttendanceStatus::Present);
    assert_eq!(status_of("Bob"), AttendanceStatus::Absent);
    assert_eq!(status_of("Carol"), AttendanceStatus::Present);

    // reconciliation always ends in the Locked state
    let session = db::sessions::get_session(&pool, session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.locked);
    assert!(session.locked_at.is_some());
}

#[tokio::test]
async fn aggregates_survive_save_reload_recount() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-G",
        "207",
        &["Alice", "Bob", "Carol", "Dina"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    reconcile::reconcile(&pool, session_id, &[face("Bob", 0.9)], now)
        .await
        .unwrap();

    // reload and recount from scratch; stored aggregates must agree
    let session = db::sessions::get_session(&pool, session_id)
        .await
        .unwrap()
        .unwrap();
    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    let recounted = AttendanceCounts::from_roster(&roster);

    assert_eq!(session.present_count, recounted.present);
    assert_eq!(session.absent_count, recounted.absent);
    assert_eq!(session.not_considered_count, recounted.not_considered);
    assert_eq!(session.percentage, recounted.percentage);
    assert_eq!(recounted.present, 1);
    assert_eq!(recounted.percentage, 25.0);
}

#[tokio::test]
async fn locked_session_rejects_reconciliation_but_stays_readable() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-H",
        "208",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    reconcile::reconcile(&pool, session_id, &[face("Alice", 0.9)], now)
        .await
        .unwrap();

    // second run is rejected
    let err = reconcile::reconcile(&pool, session_id, &[], now)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Locked { .. }));

    // the first run's roster is intact and readable
    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    assert_eq!(roster[0].status, AttendanceStatus::Present);
}

#[tokio::test]
async fn storage_layer_rejects_override_on_locked_session() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-O",
        "217",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;
    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    let alice_id = roster[0].student_id;

    // a concurrent reconciliation locks the session after any caller-side
    // lock check could have run
    db::sessions::mark_locked(&pool, session_id, now).await.unwrap();

    let err = db::sessions::override_roster_status(
        &pool,
        session_id,
        alice_id,
        AttendanceStatus::Present,
        None,
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Locked { .. }));

    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    assert_eq!(roster[0].status, AttendanceStatus::Absent);
}

#[tokio::test]
async fn drift_sync_skips_expired_session_and_flips_it_locked() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-P",
        "218",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    sqlx::query("UPDATE attendance_sessions SET lock_deadline = ? WHERE id = ?")
        .bind((now - Duration::hours(1)).to_rfc3339())
        .bind(session_id.to_string())
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE sections SET room = '318' WHERE id = ?")
        .bind(section.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let listed = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    // the expired session was finalized, not dragged along with the move
    assert!(listed[0].locked);
    assert_eq!(listed[0].room, "218");
    let stored = db::sessions::get_session(&pool, session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.locked);
    assert_eq!(stored.room, "218");
}

#[tokio::test]
async fn expired_open_session_flips_locked_on_mutation_attempt() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-I",
        "209",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    // push the deadline into the past
    sqlx::query("UPDATE attendance_sessions SET lock_deadline = ? WHERE id = ?")
        .bind((now - Duration::hours(1)).to_rfc3339())
        .bind(session_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let err = reconcile::reconcile(&pool, session_id, &[face("Alice", 0.9)], now)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Locked { .. }));

    // the rejection itself flipped the state
    let session = db::sessions::get_session(&pool, session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.locked);

    // and the roster was never partially updated
    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    assert_eq!(roster[0].status, AttendanceStatus::Absent);
}

#[tokio::test]
async fn unlock_reopens_with_fresh_deadline() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-J",
        "211",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    reconcile::reconcile(&pool, session_id, &[], now).await.unwrap();
    lock::unlock_session(&pool, session_id, now, config.lock_window_hours)
        .await
        .unwrap();

    let session = db::sessions::get_session(&pool, session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!session.locked);
    assert!(session.locked_at.is_none());
    assert!(session.lock_deadline > now);

    // a reopened session accepts reconciliation again
    let outcome = reconcile::reconcile(&pool, session_id, &[face("Alice", 0.95)], now)
        .await
        .unwrap();
    assert_eq!(outcome.counts.present, 1);
}

#[tokio::test]
async fn not_considered_override_survives_reconciliation() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-K",
        "212",
        &["Alice", "Bob"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session_id = sessions[0].id;

    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    let alice_id = roster
        .iter()
        .find(|e| e.student_name == "Alice")
        .unwrap()
        .student_id;

    db::sessions::override_roster_status(
        &pool,
        session_id,
        alice_id,
        AttendanceStatus::NotConsidered,
        Some("medical leave".to_string()),
        now,
    )
    .await
    .unwrap();

    // recognition sees Alice, but the override wins
    let outcome = reconcile::reconcile(&pool, session_id, &[face("Alice", 0.99)], now)
        .await
        .unwrap();
    assert_eq!(outcome.counts.not_considered, 1);
    assert_eq!(outcome.counts.present, 0);
    assert_eq!(outcome.counts.absent, 1);
    assert_eq!(outcome.counts.percentage, 0.0);

    let roster = db::sessions::load_roster(&pool, session_id).await.unwrap();
    let alice = roster.iter().find(|e| e.student_id == alice_id).unwrap();
    assert_eq!(alice.status, AttendanceStatus::NotConsidered);
    assert_eq!(alice.remarks.as_deref(), Some("medical leave"));
}

#[tokio::test]
async fn stale_version_write_is_rejected_without_partial_update() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-L",
        "213",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();
    let sessions = materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();
    let session = &sessions[0];

    // another writer bumps the version underneath us
    sqlx::query("UPDATE attendance_sessions SET version = version + 1 WHERE id = ?")
        .bind(session.id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let err = db::sessions::apply_reconciliation(
        &pool,
        session.id,
        session.version, // stale
        &[],
        AttendanceCounts {
            present: 1,
            absent: 0,
            not_considered: 0,
            percentage: 100.0,
        },
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::VersionConflict(_)));

    let stored = db::sessions::get_session(&pool, session.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.locked, "losing writer must not lock the session");
    assert_eq!(stored.present_count, 0, "losing writer must not write counts");
}

#[tokio::test]
async fn ad_hoc_sessions_are_never_auto_synced() {
    let (pool, config) = setup().await;
    let section = seed_section(
        &pool,
        "CS-M",
        "214",
        &["Alice"],
        &[(&["Monday"], "10:00", "10:50")],
    )
    .await;
    let now = Utc::now();

    let created = materializer::create_ad_hoc_sessions(
        &pool,
        &config,
        section.id,
        monday(),
        &[t("15:00")],
        now,
    )
    .await
    .unwrap();
    let ad_hoc_id = created[0].id;

    sqlx::query("UPDATE sections SET room = '999' WHERE id = ?")
        .bind(section.id.to_string())
        .execute(&pool)
        .await
        .unwrap();
    materializer::ensure_sessions_for(&pool, &config, section.id, monday(), now)
        .await
        .unwrap();

    let ad_hoc = db::sessions::get_session(&pool, ad_hoc_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ad_hoc.room, "214", "extra classes keep their room");
}
