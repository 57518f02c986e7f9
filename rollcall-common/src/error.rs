//! Common error types for rollcall

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Common result type for rollcall operations
pub type Result<T> = std::result::Result<T, Error>;

/// The booking that an operation collided with.
///
/// Attached to [`Error::Conflict`] so callers can tell the user exactly
/// which existing booking blocks them.
#[derive(Debug, Clone, Serialize)]
pub struct Clash {
    /// Existing session id, when the clash is against a materialized session
    pub session_id: Option<Uuid>,
    /// Room scope (ad-hoc session conflicts)
    pub room: Option<String>,
    /// Weekday scope (permanent-slot conflicts)
    pub day: Option<String>,
    /// Start of the colliding booking, "HH:MM"
    pub start_time: String,
    /// End of the colliding booking, "HH:MM"
    pub end_time: String,
}

/// Common error types across the rollcall services
#[derive(Error, Debug)]
pub enum Error {
    /// Overlapping booking. Never retried; surfaced to the caller with the
    /// colliding booking attached.
    #[error("booking conflict: busy from {} to {}", .0.start_time, .0.end_time)]
    Conflict(Clash),

    /// Mutation attempted on a finalized session
    #[error("session {session_id} is locked; changes are no longer allowed")]
    Locked {
        session_id: Uuid,
        locked_at: Option<DateTime<Utc>>,
    },

    /// Concurrent writers raced on the same session; the loser retries
    /// against refreshed state
    #[error("session {0} was modified concurrently")]
    VersionConflict(Uuid),

    /// Requested resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Recognition service returned a payload none of the known shapes match.
    /// The raw payload is preserved for operator diagnosis.
    #[error("unrecognized recognition response shape ({} bytes)", payload.len())]
    ResponseFormatUnrecognized { payload: String },

    /// Recognition service unreachable after retry exhaustion
    #[error("recognition service unavailable after {attempts} attempts: {message}")]
    UpstreamTransient { attempts: u32, message: String },

    /// Recognition service rejected the request; retrying will not help
    #[error("recognition service rejected request (status {status}): {message}")]
    UpstreamFatal { status: u16, message: String },

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when this is a SQLite UNIQUE constraint violation.
    ///
    /// The `(section, date, start_time)` unique index is the sole
    /// concurrency-correctness mechanism for session materialization, so
    /// callers need to distinguish this case from other database failures.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                // SQLite: 2067 = SQLITE_CONSTRAINT_UNIQUE, 1555 = PRIMARY KEY
                matches!(db_err.code().as_deref(), Some("2067") | Some("1555"))
                    || db_err.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}
