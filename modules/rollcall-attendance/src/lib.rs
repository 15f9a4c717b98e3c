//! Attendance strategy engine.
//!
//! Converts heterogeneous session schedules into a pass/fail determination:
//! the strategy is derived once from the shape of the session list, marks
//! are idempotent upserts, and the outcome is recomputed on demand from the
//! records; it is never stored.

pub mod engine;
pub mod strategy;

pub use engine::{outcome_for, AttendanceEngine};
pub use strategy::derive_strategy;
