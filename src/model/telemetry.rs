//! Sensor telemetry reported by the tanks

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which tank a record came from. Each kind has its own local table and
/// remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    MainTank,
    SamplingTank,
}

impl TelemetryKind {
    pub const ALL: [TelemetryKind; 2] = [TelemetryKind::MainTank, TelemetryKind::SamplingTank];

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::MainTank => "main_tank",
            TelemetryKind::SamplingTank => "sampling_tank",
        }
    }
}

/// Main tank sensor report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainTankReading {
    pub timestamp: String,
    #[serde(rename = "temperature_C", default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub light_intensity_lux: Option<f64>,
    #[serde(default)]
    pub water_level_cm: Option<f64>,
    #[serde(rename = "pH_value", default)]
    pub ph_value: Option<f64>,
}

/// Sampling tank sensor report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingTankReading {
    pub timestamp: String,
    #[serde(rename = "EC_value", default)]
    pub ec_value: Option<f64>,
}

/// One telemetry record. The timestamp doubles as its key locally and as
/// the remote document id.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    MainTank(MainTankReading),
    SamplingTank(SamplingTankReading),
}

impl TelemetryRecord {
    /// Parse a device payload of the given kind.
    pub fn parse(kind: TelemetryKind, payload: &[u8]) -> Result<Self, PayloadError> {
        let record = match kind {
            TelemetryKind::MainTank => TelemetryRecord::MainTank(serde_json::from_slice(payload)?),
            TelemetryKind::SamplingTank => {
                TelemetryRecord::SamplingTank(serde_json::from_slice(payload)?)
            }
        };

        if record.timestamp().trim().is_empty() {
            return Err(PayloadError::MissingTimestamp);
        }
        Ok(record)
    }

    pub fn kind(&self) -> TelemetryKind {
        match self {
            TelemetryRecord::MainTank(_) => TelemetryKind::MainTank,
            TelemetryRecord::SamplingTank(_) => TelemetryKind::SamplingTank,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            TelemetryRecord::MainTank(r) => &r.timestamp,
            TelemetryRecord::SamplingTank(r) => &r.timestamp,
        }
    }

    /// Remote document body. The local `uploaded` flag never leaves the node.
    pub fn to_document(&self) -> Value {
        let value = match self {
            TelemetryRecord::MainTank(r) => serde_json::to_value(r),
            TelemetryRecord::SamplingTank(r) => serde_json::to_value(r),
        };
        // Plain structs of strings and optional floats always serialize.
        value.unwrap_or(Value::Null)
    }
}

/// Inbound payload that cannot become a record
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("No telemetry kind mapped to topic {0}")]
    UnknownTopic(String),

    #[error("Invalid telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Telemetry record has no timestamp")]
    MissingTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_main_tank_payload() {
        let payload = br#"{
            "timestamp": "2025-03-01 08:00:00",
            "temperature_C": 24.5,
            "light_intensity_lux": 1200,
            "water_level_cm": 31.2,
            "pH_value": 7.1
        }"#;

        let record = TelemetryRecord::parse(TelemetryKind::MainTank, payload).unwrap();
        assert_eq!(record.kind(), TelemetryKind::MainTank);
        assert_eq!(record.timestamp(), "2025-03-01 08:00:00");
        match record {
            TelemetryRecord::MainTank(r) => {
                assert_eq!(r.temperature_c, Some(24.5));
                assert_eq!(r.light_intensity_lux, Some(1200.0));
                assert_eq!(r.ph_value, Some(7.1));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_missing_sensor_fields_are_none() {
        let payload = br#"{"timestamp": "t1"}"#;
        let record = TelemetryRecord::parse(TelemetryKind::SamplingTank, payload).unwrap();
        assert_eq!(
            record,
            TelemetryRecord::SamplingTank(SamplingTankReading {
                timestamp: "t1".into(),
                ec_value: None,
            })
        );
    }

    #[test]
    fn test_rejects_missing_or_blank_timestamp() {
        let missing = TelemetryRecord::parse(TelemetryKind::SamplingTank, br#"{"EC_value": 1.4}"#);
        assert!(matches!(missing, Err(PayloadError::Json(_))));

        let blank = TelemetryRecord::parse(TelemetryKind::SamplingTank, br#"{"timestamp": " "}"#);
        assert!(matches!(blank, Err(PayloadError::MissingTimestamp)));
    }

    #[test]
    fn test_rejects_garbage() {
        let result = TelemetryRecord::parse(TelemetryKind::MainTank, b"not json");
        assert!(matches!(result, Err(PayloadError::Json(_))));
    }

    #[test]
    fn test_document_uses_device_field_names() {
        let record = TelemetryRecord::SamplingTank(SamplingTankReading {
            timestamp: "t9".into(),
            ec_value: Some(1.8),
        });
        assert_eq!(
            record.to_document(),
            json!({"timestamp": "t9", "EC_value": 1.8})
        );
    }
}
