//! HTTP error mapping for rollcall-engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rollcall_common::Error;
use serde_json::json;

/// Wrapper giving `rollcall_common::Error` an HTTP representation
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match &self.0 {
            Error::Conflict(clash) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                Some(json!({ "clash": clash })),
            ),
            Error::VersionConflict(_) => (StatusCode::CONFLICT, "CONFLICT", None),
            Error::Locked {
                session_id,
                locked_at,
            } => (
                StatusCode::LOCKED,
                "LOCKED",
                Some(json!({ "session_id": session_id, "locked_at": locked_at })),
            ),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            Error::ResponseFormatUnrecognized { payload } => (
                StatusCode::BAD_GATEWAY,
                "RESPONSE_FORMAT_UNRECOGNIZED",
                // raw payload preserved for operator diagnosis
                Some(json!({ "payload": payload })),
            ),
            Error::UpstreamTransient { attempts, .. } => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_TRANSIENT",
                Some(json!({ "attempts": attempts })),
            ),
            Error::UpstreamFatal { status, .. } => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_FATAL",
                Some(json!({ "upstream_status": status })),
            ),
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
            }
        };

        let mut error = json!({
            "code": code,
            "message": self.0.to_string(),
        });
        if let Some(detail) = detail {
            error["detail"] = detail;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
