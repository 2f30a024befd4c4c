//! Outbound device commands and their wire encoding

use serde::Serialize;
use serde_json::{Map, Value};

use super::control::{ControlPatch, ControlSnapshot};

/// MQTT delivery level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// A message ready to hand to the messaging transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Value,
    pub qos: QoS,
    pub retain: bool,
}

/// The two telemetry cadences tracked per system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Primary,
    Sampling,
}

impl Cadence {
    pub const ALL: [Cadence; 2] = [Cadence::Primary, Cadence::Sampling];

    pub fn command_type(&self) -> &'static str {
        match self {
            Cadence::Primary => "GET_PRIMARY",
            Cadence::Sampling => "GET_SAMPLING",
        }
    }
}

/// Control parameter push to a device
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Every control field; retained so late-joining devices converge
    FullSync {
        entity_id: String,
        snapshot: ControlSnapshot,
    },
    /// Only the fields that changed
    Update {
        entity_id: String,
        patch: ControlPatch,
    },
}

impl ControlCommand {
    pub fn entity_id(&self) -> &str {
        match self {
            ControlCommand::FullSync { entity_id, .. } => entity_id,
            ControlCommand::Update { entity_id, .. } => entity_id,
        }
    }

    pub fn into_message(self) -> OutboundMessage {
        let (entity_id, kind, fields, retain) = match self {
            ControlCommand::FullSync {
                entity_id,
                snapshot,
            } => (entity_id, "FULL_SYNC", snapshot.to_fields(), true),
            ControlCommand::Update { entity_id, patch } => {
                (entity_id, "UPDATE", patch.to_fields(), false)
            }
        };

        let mut payload = Map::new();
        payload.insert("type".to_string(), Value::String(kind.to_string()));
        payload.extend(fields);

        OutboundMessage {
            topic: control_topic(&entity_id),
            payload: Value::Object(payload),
            qos: QoS::AtLeastOnce,
            retain,
        }
    }
}

/// Request for a device to report one cadence's sensors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullCommand {
    pub entity_id: String,
    pub cadence: Cadence,
}

impl PullCommand {
    pub fn into_message(self) -> OutboundMessage {
        OutboundMessage {
            topic: log_sensor_topic(&self.entity_id),
            payload: serde_json::json!({ "type": self.cadence.command_type() }),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }
}

pub fn control_topic(entity_id: &str) -> String {
    format!("{}/control", entity_id)
}

pub fn log_sensor_topic(entity_id: &str) -> String {
    format!("{}/log_sensor", entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_sync_is_retained_with_all_fields() {
        let snapshot = ControlSnapshot {
            target_light_duration: Some(16.0),
            target_water_level: Some(42.5),
            ..Default::default()
        };
        let message = ControlCommand::FullSync {
            entity_id: "system_1".into(),
            snapshot,
        }
        .into_message();

        assert_eq!(message.topic, "system_1/control");
        assert!(message.retain);
        assert_eq!(message.qos, QoS::AtLeastOnce);
        assert_eq!(
            message.payload,
            json!({
                "type": "FULL_SYNC",
                "target_light_duration": 16.0,
                "target_light_intensity": null,
                "target_stirring_speed": null,
                "target_water_level": 42.5
            })
        );
    }

    #[test]
    fn test_update_is_not_retained() {
        let old = ControlSnapshot::default();
        let new = ControlSnapshot {
            target_stirring_speed: Some(250.0),
            ..Default::default()
        };
        let message = ControlCommand::Update {
            entity_id: "system_2".into(),
            patch: new.diff(&old),
        }
        .into_message();

        assert!(!message.retain);
        assert_eq!(
            message.payload,
            json!({"type": "UPDATE", "target_stirring_speed": 250.0})
        );
    }

    #[test]
    fn test_pull_command_payload() {
        let message = PullCommand {
            entity_id: "tank_1".into(),
            cadence: Cadence::Sampling,
        }
        .into_message();

        assert_eq!(message.topic, "tank_1/log_sensor");
        assert_eq!(message.payload, json!({"type": "GET_SAMPLING"}));
        assert!(!message.retain);
    }

    #[test]
    fn test_outbound_message_wire_shape() {
        let message = PullCommand {
            entity_id: "tank_1".into(),
            cadence: Cadence::Primary,
        }
        .into_message();

        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(wire["qos"], json!(1));
        assert_eq!(wire["retain"], json!(false));
        assert_eq!(wire["payload"]["type"], json!("GET_PRIMARY"));
    }
}
