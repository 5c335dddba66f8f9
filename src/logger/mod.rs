//! Append-only JSONL activity log with graceful degradation.

pub mod activity;

pub use activity::{ActivityEntry, ActivityLog, EventType, Severity};
