//! Configuration sync - remote config changes into device commands
//!
//! Handles:
//! - Cold start priming of the shadow state
//! - Minimal control patches (UPDATE) and full pushes (FULL_SYNC)
//! - Scheduler retargeting on logging interval changes

pub mod diff;
pub mod protocol;

// Re-exports
pub use diff::{ChangeDiffEngine, LogChange};
pub use protocol::{ChangeEvent, ChangeKind, ConfigCollection};
