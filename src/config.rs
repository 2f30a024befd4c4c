//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::forward::TelemetryCollections;
use crate::model::{IntervalDefaults, TelemetryKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Telemetry topics devices publish on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_main_tank_topic")]
    pub main_tank_topic: String,

    #[serde(default = "default_sampling_tank_topic")]
    pub sampling_tank_topic: String,
}

/// Remote document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the document API. Without one the node runs against an
    /// in-memory store (dry run).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_control_collection")]
    pub control_collection: String,

    #[serde(default = "default_log_collection")]
    pub log_collection: String,

    #[serde(default = "default_main_tank_collection")]
    pub main_tank_collection: String,

    #[serde(default = "default_sampling_tank_collection")]
    pub sampling_tank_collection: String,

    /// Change feed polling interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// First delay between cold start attempts while the store is down
    #[serde(default = "default_retry_initial")]
    pub retry_initial_secs: u64,

    /// Cap for the doubling cold start retry delay
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Outbox database location; defaults to the node data directory
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Scheduler tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Primary interval for systems without one configured
    #[serde(default = "default_primary_secs")]
    pub default_primary_secs: u64,

    /// Sampling interval for systems without one configured
    #[serde(default = "default_sampling_secs")]
    pub default_sampling_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Backlog sweep interval in seconds
    #[serde(default = "default_backlog_interval")]
    pub backlog_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve the status API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

// Defaults
fn default_node_id() -> String { "canopy-1".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("/var/lib/canopy") }
fn default_main_tank_topic() -> String { "main_tank/data".to_string() }
fn default_sampling_tank_topic() -> String { "sampling_tank/data".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_control_collection() -> String { "system_controls".to_string() }
fn default_log_collection() -> String { "log_interval".to_string() }
fn default_main_tank_collection() -> String { "main_tank_data".to_string() }
fn default_sampling_tank_collection() -> String { "sampling_tank_data".to_string() }
fn default_poll_interval() -> u64 { 5 }
fn default_retry_initial() -> u64 { 2 }
fn default_retry_max() -> u64 { 60 }
fn default_tick_ms() -> u64 { 1000 }
fn default_primary_secs() -> u64 { 3600 } // 1 hour
fn default_sampling_secs() -> u64 { 43200 } // 12 hours
fn default_backlog_interval() -> u64 { 20 }
fn default_true() -> bool { true }
fn default_http_port() -> u16 { 8080 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            main_tank_topic: default_main_tank_topic(),
            sampling_tank_topic: default_sampling_tank_topic(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            control_collection: default_control_collection(),
            log_collection: default_log_collection(),
            main_tank_collection: default_main_tank_collection(),
            sampling_tank_collection: default_sampling_tank_collection(),
            poll_interval_secs: default_poll_interval(),
            retry_initial_secs: default_retry_initial(),
            retry_max_secs: default_retry_max(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            default_primary_secs: default_primary_secs(),
            default_sampling_secs: default_sampling_secs(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            backlog_interval_secs: default_backlog_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http_port: default_http_port(),
        }
    }
}

impl Config {
    /// Directory holding the outbox database
    pub fn outbox_dir(&self) -> PathBuf {
        self.storage
            .outbox_dir
            .clone()
            .unwrap_or_else(|| self.node.data_dir.clone())
    }
}

impl BrokerConfig {
    /// Telemetry kind carried on `topic`, if any
    pub fn kind_for_topic(&self, topic: &str) -> Option<TelemetryKind> {
        if topic == self.main_tank_topic {
            Some(TelemetryKind::MainTank)
        } else if topic == self.sampling_tank_topic {
            Some(TelemetryKind::SamplingTank)
        } else {
            None
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_secs(self.retry_initial_secs.max(1))
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs.max(1))
    }

    pub fn telemetry_collections(&self) -> TelemetryCollections {
        TelemetryCollections {
            main_tank: self.main_tank_collection.clone(),
            sampling_tank: self.sampling_tank_collection.clone(),
        }
    }
}

impl ScheduleConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn interval_defaults(&self) -> IntervalDefaults {
        IntervalDefaults {
            primary: Duration::from_secs(self.default_primary_secs),
            sampling: Duration::from_secs(self.default_sampling_secs),
        }
    }
}

impl OutboxConfig {
    pub fn backlog_interval(&self) -> Duration {
        Duration::from_secs(self.backlog_interval_secs.max(1))
    }
}
