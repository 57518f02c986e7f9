//! rollcall-engine - Attendance session engine service
//!
//! Materializes dated attendance sessions from recurring weekly
//! timetables, rejects scheduling conflicts, governs the session lock
//! state machine, and reconciles face-recognition batches against session
//! rosters.

use axum::Router;
use rollcall_common::config::EngineConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::recognition::RecognitionClient;

pub mod api;
pub mod db;
pub mod engine;
pub mod error;
pub mod recognition;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<EngineConfig>,
    /// Retrying client for the batch face-recognition service
    pub recognition: Arc<RecognitionClient>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: EngineConfig) -> Self {
        let recognition = Arc::new(RecognitionClient::new(config.recognition.clone()));
        Self {
            db,
            config: Arc::new(config),
            recognition,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, patch, post};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", get(api::health::health))
        .route(
            "/api/sections/:id/sessions/today",
            get(api::sessions::today_sessions),
        )
        .route("/api/sections/:id/slots", post(api::schedule::add_slot))
        .route("/api/sessions/ad-hoc", post(api::sessions::create_ad_hoc))
        .route("/api/sessions/:id", get(api::sessions::session_details))
        .route("/api/sessions/:id/lock", post(api::sessions::lock))
        .route("/api/sessions/:id/unlock", post(api::sessions::unlock))
        .route(
            "/api/sessions/:id/mark-face",
            post(api::attendance::mark_with_face),
        )
        .route(
            "/api/sessions/:id/roster/:student_id",
            patch(api::attendance::override_status),
        )
        .route(
            "/api/students/:id/attendance",
            get(api::students::attendance_stats),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
