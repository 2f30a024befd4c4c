//! Typed records for everything that crosses the daemon's boundaries
//!
//! Remote documents and device payloads arrive as loose JSON; they are
//! converted here, once, into the records the core works with.

pub mod command;
pub mod control;
pub mod log_config;
pub mod telemetry;

pub use command::{Cadence, ControlCommand, OutboundMessage, PullCommand, QoS};
pub use control::{ControlField, ControlPatch, ControlSnapshot};
pub use log_config::{IntervalDefaults, LogConfig};
pub use telemetry::{
    MainTankReading, PayloadError, SamplingTankReading, TelemetryKind, TelemetryRecord,
};

use serde_json::Value;

/// Read a numeric field out of a loose document. Anything that is not a JSON
/// number counts as absent.
pub(crate) fn number_field(doc: &Value, key: &str) -> Option<f64> {
    doc.get(key).and_then(Value::as_f64)
}
