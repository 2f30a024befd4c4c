//! Change notifications from the remote configuration store

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration collections the daemon watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigCollection {
    /// Per-system actuator targets
    Controls,
    /// Per-system telemetry logging intervals
    LogIntervals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document-level change in a watched collection
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: ConfigCollection,
    pub entity_id: String,
    pub kind: ChangeKind,
    /// Document contents after the change (last known contents for removals)
    pub document: Value,
}

impl ChangeEvent {
    pub fn modified(
        collection: ConfigCollection,
        entity_id: impl Into<String>,
        document: Value,
    ) -> Self {
        Self {
            collection,
            entity_id: entity_id.into(),
            kind: ChangeKind::Modified,
            document,
        }
    }
}
