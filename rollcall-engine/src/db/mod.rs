//! Database access layer for rollcall-engine

pub mod sections;
pub mod sessions;

use chrono::{DateTime, Utc};
use rollcall_common::{Error, Result};
use uuid::Uuid;

/// Parse a TEXT uuid column
pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("failed to parse {}: {}", column, e)))
}

/// Parse an RFC 3339 TEXT timestamp column
pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("failed to parse {}: {}", column, e)))
}
