//! The attendance session engine
//!
//! Four cooperating parts:
//! - `materializer`: turns weekly timetable slots into dated sessions,
//!   idempotently, and creates ad-hoc sessions on request
//! - `conflict`: half-open interval overlap detection for rooms and
//!   permanent slots
//! - `lock`: the Open → Locked state machine, including passive expiry
//! - `reconcile`: applies recognition output to a session roster and
//!   recomputes the derived counts

pub mod conflict;
pub mod lock;
pub mod materializer;
pub mod reconcile;
