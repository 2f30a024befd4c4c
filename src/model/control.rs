//! Control parameter snapshots and the patches computed between them

use serde_json::{Map, Value};

use super::number_field;

/// Control fields the diff engine watches. Other keys in a remote document
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlField {
    LightDuration,
    LightIntensity,
    StirringSpeed,
    WaterLevel,
}

impl ControlField {
    pub const ALL: [ControlField; 4] = [
        ControlField::LightDuration,
        ControlField::LightIntensity,
        ControlField::StirringSpeed,
        ControlField::WaterLevel,
    ];

    /// Key used both in the remote document and in device payloads
    pub fn key(&self) -> &'static str {
        match self {
            ControlField::LightDuration => "target_light_duration",
            ControlField::LightIntensity => "target_light_intensity",
            ControlField::StirringSpeed => "target_stirring_speed",
            ControlField::WaterLevel => "target_water_level",
        }
    }
}

/// Last known control parameters for one system
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlSnapshot {
    pub target_light_duration: Option<f64>,
    pub target_light_intensity: Option<f64>,
    pub target_stirring_speed: Option<f64>,
    pub target_water_level: Option<f64>,
}

impl ControlSnapshot {
    /// Build a snapshot from a remote document.
    ///
    /// Never fails: missing or non-numeric fields become `None` and take part
    /// in comparisons like any other value.
    pub fn from_document(doc: &Value) -> Self {
        let mut snapshot = Self::default();
        for field in ControlField::ALL {
            snapshot.set(field, number_field(doc, field.key()));
        }
        snapshot
    }

    pub fn get(&self, field: ControlField) -> Option<f64> {
        match field {
            ControlField::LightDuration => self.target_light_duration,
            ControlField::LightIntensity => self.target_light_intensity,
            ControlField::StirringSpeed => self.target_stirring_speed,
            ControlField::WaterLevel => self.target_water_level,
        }
    }

    pub fn set(&mut self, field: ControlField, value: Option<f64>) {
        match field {
            ControlField::LightDuration => self.target_light_duration = value,
            ControlField::LightIntensity => self.target_light_intensity = value,
            ControlField::StirringSpeed => self.target_stirring_speed = value,
            ControlField::WaterLevel => self.target_water_level = value,
        }
    }

    /// Fields of `self` that differ from `old`, carrying the new values.
    /// Comparison is exact.
    pub fn diff(&self, old: &ControlSnapshot) -> ControlPatch {
        let changes = ControlField::ALL
            .into_iter()
            .filter(|field| self.get(*field) != old.get(*field))
            .map(|field| (field, self.get(field)))
            .collect();
        ControlPatch { changes }
    }

    /// Every watched field, absent ones as `null`
    pub fn to_fields(&self) -> Map<String, Value> {
        ControlField::ALL
            .into_iter()
            .map(|field| (field.key().to_string(), json_number(self.get(field))))
            .collect()
    }
}

/// Changed control fields, in watched-field order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPatch {
    changes: Vec<(ControlField, Option<f64>)>,
}

impl ControlPatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = ControlField> + '_ {
        self.changes.iter().map(|(field, _)| *field)
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        self.changes
            .iter()
            .map(|(field, value)| (field.key().to_string(), json_number(*value)))
            .collect()
    }
}

fn json_number(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_document_ignores_unwatched_and_malformed() {
        let doc = json!({
            "target_light_duration": 12,
            "target_light_intensity": "bright",
            "target_stirring_speed": 300.5,
            "operator_note": "refilled"
        });

        let snapshot = ControlSnapshot::from_document(&doc);
        assert_eq!(snapshot.target_light_duration, Some(12.0));
        assert_eq!(snapshot.target_light_intensity, None);
        assert_eq!(snapshot.target_stirring_speed, Some(300.5));
        assert_eq!(snapshot.target_water_level, None);
    }

    #[test]
    fn test_diff_only_changed_fields() {
        let old = ControlSnapshot {
            target_light_duration: Some(1.0),
            target_light_intensity: Some(2.0),
            ..Default::default()
        };
        let new = ControlSnapshot {
            target_light_duration: Some(1.0),
            target_light_intensity: Some(3.0),
            ..Default::default()
        };

        let patch = new.diff(&old);
        assert_eq!(patch.len(), 1);
        assert_eq!(
            patch.fields().collect::<Vec<_>>(),
            vec![ControlField::LightIntensity]
        );
        assert_eq!(
            Value::Object(patch.to_fields()),
            json!({"target_light_intensity": 3.0})
        );
    }

    #[test]
    fn test_diff_against_empty_is_present_fields() {
        let new = ControlSnapshot {
            target_water_level: Some(40.0),
            ..Default::default()
        };
        let patch = new.diff(&ControlSnapshot::default());
        assert_eq!(
            patch.fields().collect::<Vec<_>>(),
            vec![ControlField::WaterLevel]
        );
    }

    #[test]
    fn test_removed_field_patches_to_null() {
        let old = ControlSnapshot {
            target_stirring_speed: Some(200.0),
            ..Default::default()
        };
        let patch = ControlSnapshot::default().diff(&old);
        assert_eq!(
            Value::Object(patch.to_fields()),
            json!({"target_stirring_speed": null})
        );
    }

    #[test]
    fn test_to_fields_lists_every_watched_field() {
        let fields = ControlSnapshot::default().to_fields();
        assert_eq!(fields.len(), ControlField::ALL.len());
        assert!(fields.values().all(Value::is_null));
    }
}
