//! canopy-node: edge sync daemon for a fleet of cultivation units
//!
//! Keeps device control parameters aligned with a remote configuration
//! store, schedules telemetry pulls per device on two cadences, and buffers
//! telemetry locally so a remote outage never loses data.

pub mod api;
pub mod config;
pub mod forward;
pub mod model;
pub mod node;
pub mod schedule;
pub mod storage;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use node::{IngestOutcome, Node};
