//! Storage layer - local state the daemon keeps
//!
//! Handles:
//! - Shadow copies of remote configuration (in memory)
//! - The telemetry outbox (SQLite)

pub mod outbox;
pub mod shadow;

pub use outbox::{blocking, OutboxError, OutboxStore, PendingCounts, PendingRecords};
pub use shadow::ShadowStore;
