//! # Rollcall Common Library
//!
//! Shared code for the rollcall attendance services including:
//! - Database schema and connection setup
//! - Domain models (sections, slots, sessions, roster entries)
//! - Error taxonomy
//! - Configuration loading
//! - Time-of-day and timezone utilities

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use time::SlotTime;
