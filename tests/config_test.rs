//! Config loading and defaults integration tests

use std::path::PathBuf;
use std::time::Duration;

use canopy_node::config::Config;
use canopy_node::model::TelemetryKind;

/// An empty file is a valid config; every field has a default.
#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").expect("empty TOML should parse");

    assert_eq!(config.node.id, "canopy-1");
    assert_eq!(config.broker.main_tank_topic, "main_tank/data");
    assert_eq!(config.broker.sampling_tank_topic, "sampling_tank/data");
    assert_eq!(config.remote.base_url, None);
    assert_eq!(config.remote.control_collection, "system_controls");
    assert_eq!(config.remote.log_collection, "log_interval");
    assert_eq!(config.remote.retry_initial(), Duration::from_secs(2));
    assert_eq!(config.remote.retry_max(), Duration::from_secs(60));
    assert_eq!(config.outbox.backlog_interval(), Duration::from_secs(20));
    assert_eq!(config.schedule.tick_period(), Duration::from_secs(1));
    assert!(config.api.enabled);
    assert_eq!(config.api.http_port, 8080);

    let defaults = config.schedule.interval_defaults();
    assert_eq!(defaults.primary, Duration::from_secs(3600));
    assert_eq!(defaults.sampling, Duration::from_secs(43200));
}

#[test]
fn test_config_with_all_fields() {
    let toml_str = r#"
[node]
id = "greenhouse-2"
data_dir = "/var/lib/canopy-gh2"

[broker]
main_tank_topic = "gh2/main_tank/data"
sampling_tank_topic = "gh2/sampling_tank/data"

[remote]
base_url = "https://store.example.net/v1"
request_timeout_secs = 3
control_collection = "controls"
log_collection = "intervals"
main_tank_collection = "main_logs"
sampling_tank_collection = "sampling_logs"
poll_interval_secs = 15
retry_initial_secs = 5
retry_max_secs = 120

[storage]
outbox_dir = "/mnt/ssd/outbox"

[schedule]
tick_ms = 500
default_primary_secs = 600
default_sampling_secs = 7200

[outbox]
backlog_interval_secs = 45

[api]
enabled = false
http_port = 9100
"#;

    let config: Config = toml::from_str(toml_str).expect("valid config");

    assert_eq!(config.node.id, "greenhouse-2");
    assert_eq!(config.outbox_dir(), PathBuf::from("/mnt/ssd/outbox"));
    assert_eq!(
        config.broker.kind_for_topic("gh2/sampling_tank/data"),
        Some(TelemetryKind::SamplingTank)
    );
    assert_eq!(config.broker.kind_for_topic("main_tank/data"), None);
    assert_eq!(config.remote.request_timeout(), Duration::from_secs(3));
    assert_eq!(config.remote.poll_interval(), Duration::from_secs(15));
    assert_eq!(config.remote.retry_initial(), Duration::from_secs(5));
    assert_eq!(config.remote.retry_max(), Duration::from_secs(120));

    let collections = config.remote.telemetry_collections();
    assert_eq!(collections.collection_for(TelemetryKind::MainTank), "main_logs");
    assert_eq!(
        collections.collection_for(TelemetryKind::SamplingTank),
        "sampling_logs"
    );

    assert_eq!(config.schedule.tick_period(), Duration::from_millis(500));
    assert_eq!(
        config.schedule.interval_defaults().primary,
        Duration::from_secs(600)
    );
    assert_eq!(config.outbox.backlog_interval(), Duration::from_secs(45));
    assert!(!config.api.enabled);
    assert_eq!(config.api.http_port, 9100);
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let toml_str = r#"
[node]
data_dir = "/tmp/canopy-test"

[schedule]
default_sampling_secs = 60
"#;

    let config: Config = toml::from_str(toml_str).expect("valid config");

    assert_eq!(config.node.id, "canopy-1");
    assert_eq!(config.outbox_dir(), PathBuf::from("/tmp/canopy-test"));
    assert_eq!(config.schedule.tick_ms, 1000);
    assert_eq!(config.schedule.default_primary_secs, 3600);
    assert_eq!(config.schedule.default_sampling_secs, 60);
}

#[test]
fn test_zero_periods_are_clamped() {
    let toml_str = r#"
[schedule]
tick_ms = 0

[remote]
retry_initial_secs = 0

[outbox]
backlog_interval_secs = 0
"#;

    let config: Config = toml::from_str(toml_str).expect("valid config");

    assert_eq!(config.schedule.tick_period(), Duration::from_millis(1));
    assert_eq!(config.outbox.backlog_interval(), Duration::from_secs(1));
    assert_eq!(config.remote.retry_initial(), Duration::from_secs(1));
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config = Config::default();
    let rendered = toml::to_string(&config).expect("serializable");
    let parsed: Config = toml::from_str(&rendered).expect("parses back");
    assert_eq!(parsed.node.id, config.node.id);
    assert_eq!(parsed.remote.poll_interval_secs, config.remote.poll_interval_secs);
}
