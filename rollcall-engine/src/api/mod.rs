//! HTTP API handlers

pub mod attendance;
pub mod health;
pub mod schedule;
pub mod sessions;
pub mod students;
