//! Per-system telemetry logging intervals

use std::time::Duration;

use serde_json::Value;

use super::command::Cadence;
use super::number_field;

const PRIMARY_KEY: &str = "primary_log_interval";
const SAMPLING_KEY: &str = "sampling_log_interval";

/// Fallback intervals for systems without an explicit configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalDefaults {
    pub primary: Duration,
    pub sampling: Duration,
}

impl Default for IntervalDefaults {
    fn default() -> Self {
        Self {
            primary: Duration::from_secs(3600),
            sampling: Duration::from_secs(43200),
        }
    }
}

/// Logging intervals in seconds as configured remotely. `None` means the
/// process-wide default applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogConfig {
    pub primary_log_interval: Option<f64>,
    pub sampling_log_interval: Option<f64>,
}

impl LogConfig {
    /// Build from a remote document. Negative, non-finite or non-numeric
    /// intervals are treated as absent.
    pub fn from_document(doc: &Value) -> Self {
        let interval = |key| number_field(doc, key).filter(|v| v.is_finite() && *v >= 0.0);
        Self {
            primary_log_interval: interval(PRIMARY_KEY),
            sampling_log_interval: interval(SAMPLING_KEY),
        }
    }

    pub fn raw(&self, cadence: Cadence) -> Option<f64> {
        match cadence {
            Cadence::Primary => self.primary_log_interval,
            Cadence::Sampling => self.sampling_log_interval,
        }
    }

    /// Effective interval for a cadence, falling back to `defaults`.
    pub fn interval(&self, cadence: Cadence, defaults: &IntervalDefaults) -> Duration {
        let fallback = match cadence {
            Cadence::Primary => defaults.primary,
            Cadence::Sampling => defaults.sampling,
        };
        self.raw(cadence)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(fallback)
    }

    /// Interval rounded to one decimal place; absent compares as zero.
    pub fn rounded(&self, cadence: Cadence) -> f64 {
        round_tenths(self.raw(cadence).unwrap_or(0.0))
    }

    /// Whether either interval differs from `other` at one-decimal resolution.
    pub fn differs_from(&self, other: &LogConfig) -> bool {
        Cadence::ALL
            .into_iter()
            .any(|cadence| self.rounded(cadence) != other.rounded(cadence))
    }
}

/// Round to one decimal on the exact binary value, ties to even
fn round_tenths(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(primary: f64, sampling: f64) -> LogConfig {
        LogConfig {
            primary_log_interval: Some(primary),
            sampling_log_interval: Some(sampling),
        }
    }

    #[test]
    fn test_rounding_hides_sub_tenth_changes() {
        assert!(!config(10.04, 60.0).differs_from(&config(10.0, 60.0)));
        assert!(config(10.06, 60.0).differs_from(&config(10.0, 60.0)));
    }

    #[test]
    fn test_rounding_uses_exact_value_ties_to_even() {
        assert_eq!(round_tenths(10.25), 10.2);
        assert_eq!(round_tenths(0.15), 0.1);
        assert_eq!(round_tenths(10.35), 10.3);

        assert!(config(10.25, 60.0).differs_from(&config(10.3, 60.0)));
        assert!(config(0.15, 60.0).differs_from(&config(0.2, 60.0)));
        assert!(!config(10.25, 60.0).differs_from(&config(10.2, 60.0)));
    }

    #[test]
    fn test_sampling_change_detected() {
        assert!(config(10.0, 61.0).differs_from(&config(10.0, 60.0)));
    }

    #[test]
    fn test_absent_compares_as_zero() {
        let empty = LogConfig::default();
        assert!(!empty.differs_from(&config(0.0, 0.04)));
        assert!(empty.differs_from(&config(5.0, 0.0)));
    }

    #[test]
    fn test_interval_falls_back_to_defaults() {
        let defaults = IntervalDefaults::default();
        let partial = LogConfig {
            primary_log_interval: Some(2.5),
            sampling_log_interval: None,
        };

        assert_eq!(
            partial.interval(Cadence::Primary, &defaults),
            Duration::from_millis(2500)
        );
        assert_eq!(
            partial.interval(Cadence::Sampling, &defaults),
            Duration::from_secs(43200)
        );
    }

    #[test]
    fn test_from_document_rejects_bad_intervals() {
        let doc = json!({
            "primary_log_interval": -5,
            "sampling_log_interval": "often"
        });
        assert_eq!(LogConfig::from_document(&doc), LogConfig::default());

        let doc = json!({"primary_log_interval": 30, "sampling_log_interval": 900.0});
        assert_eq!(LogConfig::from_document(&doc), config(30.0, 900.0));
    }
}
