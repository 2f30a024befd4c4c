//! Change diff engine - remote configuration snapshots into minimal commands
//!
//! Compares incoming snapshots with the shadow copy and emits only what a
//! device needs to hear. The two collections follow different shadow-update
//! rules:
//! - controls: the shadow is replaced only when a command is emitted
//! - log intervals: the shadow is always replaced; the scheduler is
//!   retargeted only when an interval changed at one-decimal resolution

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::protocol::{ChangeEvent, ChangeKind, ConfigCollection};
use crate::model::{Cadence, ControlCommand, ControlSnapshot, LogConfig};
use crate::schedule::{deadline_after, DualIntervalScheduler};
use crate::storage::ShadowStore;

/// Result of applying a log-interval change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChange {
    /// Both cadences restarted with these intervals
    Retargeted { primary: Duration, sampling: Duration },
    /// Same intervals at one-decimal resolution; shadow refreshed only
    Unchanged,
}

pub struct ChangeDiffEngine {
    controls: Arc<ShadowStore<ControlSnapshot>>,
    logs: Arc<ShadowStore<LogConfig>>,
    scheduler: Arc<DualIntervalScheduler>,
}

impl ChangeDiffEngine {
    pub fn new(
        controls: Arc<ShadowStore<ControlSnapshot>>,
        logs: Arc<ShadowStore<LogConfig>>,
        scheduler: Arc<DualIntervalScheduler>,
    ) -> Self {
        Self {
            controls,
            logs,
            scheduler,
        }
    }

    /// Prime the shadows from a full read of both collections.
    ///
    /// Every control snapshot yields a FULL_SYNC so devices converge after a
    /// restart. Log configs are stored silently.
    pub async fn cold_start_sync(
        &self,
        control_docs: Vec<(String, ControlSnapshot)>,
        log_docs: Vec<(String, LogConfig)>,
    ) -> Vec<ControlCommand> {
        let mut commands = Vec::with_capacity(control_docs.len());
        for (entity_id, snapshot) in control_docs {
            self.controls.set(&entity_id, snapshot.clone()).await;
            info!(entity_id = %entity_id, "Initialized control shadow");
            commands.push(ControlCommand::FullSync {
                entity_id,
                snapshot,
            });
        }

        for (entity_id, config) in log_docs {
            info!(
                entity_id = %entity_id,
                primary = ?config.primary_log_interval,
                sampling = ?config.sampling_log_interval,
                "Synced logging config"
            );
            self.logs.set(&entity_id, config).await;
        }

        commands
    }

    /// Diff a modified control document against the shadow.
    ///
    /// Returns an UPDATE with only the changed watched fields; the shadow is
    /// replaced only in that case.
    pub async fn on_control_changed(
        &self,
        entity_id: &str,
        new_snapshot: ControlSnapshot,
    ) -> Option<ControlCommand> {
        let patch = self
            .controls
            .update(entity_id, |old| {
                let patch = new_snapshot.diff(old.unwrap_or(&ControlSnapshot::default()));
                if patch.is_empty() {
                    (None, patch)
                } else {
                    (Some(new_snapshot), patch)
                }
            })
            .await;

        if patch.is_empty() {
            debug!(entity_id, "Control change had no watched-field differences");
            return None;
        }

        info!(entity_id, fields = patch.len(), "Control update");
        Some(ControlCommand::Update {
            entity_id: entity_id.to_string(),
            patch,
        })
    }

    /// Diff a modified log-interval document against the shadow and retarget
    /// the scheduler if an interval changed.
    pub async fn on_log_changed(
        &self,
        entity_id: &str,
        new_config: LogConfig,
        now: Instant,
    ) -> LogChange {
        let defaults = *self.scheduler.defaults();
        let primary = new_config.interval(Cadence::Primary, &defaults);
        let sampling = new_config.interval(Cadence::Sampling, &defaults);

        let changed = self
            .logs
            .update(entity_id, |old| {
                let changed = new_config.differs_from(old.unwrap_or(&LogConfig::default()));
                (Some(new_config), changed)
            })
            .await;

        if !changed {
            debug!(entity_id, "Logging intervals unchanged");
            return LogChange::Unchanged;
        }

        // Shadow lock is released before touching the scheduler's deadlines
        self.scheduler
            .retarget(entity_id, Cadence::Primary, deadline_after(now, primary))
            .await;
        self.scheduler
            .retarget(entity_id, Cadence::Sampling, deadline_after(now, sampling))
            .await;

        info!(
            entity_id,
            primary_secs = primary.as_secs_f64(),
            sampling_secs = sampling.as_secs_f64(),
            "Logging update, timers restarted"
        );
        LogChange::Retargeted { primary, sampling }
    }

    /// Route a change notification. Only modifications are diffed; additions
    /// and removals are picked up at the next cold start.
    pub async fn handle_event(&self, event: ChangeEvent, now: Instant) -> Option<ControlCommand> {
        if event.kind != ChangeKind::Modified {
            debug!(
                entity_id = %event.entity_id,
                kind = ?event.kind,
                collection = ?event.collection,
                "Ignoring non-modify change"
            );
            return None;
        }

        match event.collection {
            ConfigCollection::Controls => {
                let snapshot = ControlSnapshot::from_document(&event.document);
                self.on_control_changed(&event.entity_id, snapshot).await
            }
            ConfigCollection::LogIntervals => {
                let config = LogConfig::from_document(&event.document);
                self.on_log_changed(&event.entity_id, config, now).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ControlField, IntervalDefaults};
    use serde_json::{json, Value};

    struct Fixture {
        controls: Arc<ShadowStore<ControlSnapshot>>,
        logs: Arc<ShadowStore<LogConfig>>,
        scheduler: Arc<DualIntervalScheduler>,
        engine: ChangeDiffEngine,
    }

    fn fixture() -> Fixture {
        let controls = Arc::new(ShadowStore::new());
        let logs = Arc::new(ShadowStore::new());
        let scheduler = Arc::new(DualIntervalScheduler::new(
            logs.clone(),
            IntervalDefaults::default(),
            Duration::from_secs(1),
        ));
        let engine = ChangeDiffEngine::new(controls.clone(), logs.clone(), scheduler.clone());
        Fixture {
            controls,
            logs,
            scheduler,
            engine,
        }
    }

    fn snapshot(duration: f64, intensity: f64, speed: f64, level: f64) -> ControlSnapshot {
        ControlSnapshot {
            target_light_duration: Some(duration),
            target_light_intensity: Some(intensity),
            target_stirring_speed: Some(speed),
            target_water_level: Some(level),
        }
    }

    fn log_config(primary: f64, sampling: f64) -> LogConfig {
        LogConfig {
            primary_log_interval: Some(primary),
            sampling_log_interval: Some(sampling),
        }
    }

    #[tokio::test]
    async fn test_cold_start_emits_full_sync_per_system() {
        let f = fixture();
        let docs = vec![
            ("system_1".to_string(), snapshot(12.0, 800.0, 200.0, 30.0)),
            ("system_2".to_string(), snapshot(16.0, 900.0, 250.0, 35.0)),
            ("system_3".to_string(), ControlSnapshot::default()),
        ];

        let commands = f
            .engine
            .cold_start_sync(docs.clone(), vec![("system_1".into(), log_config(60.0, 600.0))])
            .await;

        assert_eq!(commands.len(), 3);
        for (command, (id, snap)) in commands.iter().zip(&docs) {
            assert_eq!(command.entity_id(), id);
            let message = command.clone().into_message();
            assert!(message.retain);
            assert_eq!(message.payload["type"], json!("FULL_SYNC"));
            for field in ControlField::ALL {
                assert!(message.payload.get(field.key()).is_some());
            }
            assert_eq!(f.controls.get(id).await.as_ref(), Some(snap));
        }
        assert_eq!(f.controls.entities().await, docs);
        assert_eq!(f.logs.get("system_1").await, Some(log_config(60.0, 600.0)));
    }

    #[tokio::test]
    async fn test_identical_snapshot_is_suppressed() {
        let f = fixture();
        let original = snapshot(12.0, 800.0, 200.0, 30.0);
        f.controls.set("system_1", original.clone()).await;

        let command = f
            .engine
            .on_control_changed("system_1", original.clone())
            .await;

        assert!(command.is_none());
        assert_eq!(f.controls.get("system_1").await, Some(original));
    }

    #[tokio::test]
    async fn test_suppressed_change_leaves_shadow_untouched() {
        let f = fixture();
        f.controls.set("system_1", snapshot(1.0, 2.0, 3.0, 4.0)).await;

        // Only an unwatched field differs in the source document
        let doc = json!({
            "target_light_duration": 1.0,
            "target_light_intensity": 2.0,
            "target_stirring_speed": 3.0,
            "target_water_level": 4.0,
            "updated_by": "console"
        });
        let event = ChangeEvent::modified(ConfigCollection::Controls, "system_1", doc);
        assert!(f.engine.handle_event(event, Instant::now()).await.is_none());
        assert_eq!(
            f.controls.get("system_1").await,
            Some(snapshot(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[tokio::test]
    async fn test_minimal_patch() {
        let f = fixture();
        f.controls
            .set(
                "system_1",
                ControlSnapshot {
                    target_light_duration: Some(1.0),
                    target_light_intensity: Some(2.0),
                    ..Default::default()
                },
            )
            .await;
        let new = ControlSnapshot {
            target_light_duration: Some(1.0),
            target_light_intensity: Some(3.0),
            ..Default::default()
        };

        let command = f
            .engine
            .on_control_changed("system_1", new.clone())
            .await
            .expect("changed field should produce an update");

        let message = command.into_message();
        assert_eq!(message.topic, "system_1/control");
        assert!(!message.retain);
        assert_eq!(
            message.payload,
            json!({"type": "UPDATE", "target_light_intensity": 3.0})
        );
        assert_eq!(f.controls.get("system_1").await, Some(new));
    }

    #[tokio::test]
    async fn test_unknown_system_patches_every_present_field() {
        let f = fixture();
        let new = ControlSnapshot {
            target_stirring_speed: Some(180.0),
            target_water_level: Some(28.0),
            ..Default::default()
        };

        let message = f
            .engine
            .on_control_changed("system_new", new)
            .await
            .unwrap()
            .into_message();

        assert_eq!(
            message.payload,
            json!({
                "type": "UPDATE",
                "target_stirring_speed": 180.0,
                "target_water_level": 28.0
            })
        );
    }

    #[tokio::test]
    async fn test_sub_tenth_interval_change_is_ignored() {
        let f = fixture();
        f.logs.set("tank_1", log_config(10.0, 600.0)).await;

        let outcome = f
            .engine
            .on_log_changed("tank_1", log_config(10.04, 600.0), Instant::now())
            .await;

        assert_eq!(outcome, LogChange::Unchanged);
        assert!(f.scheduler.state("tank_1").await.is_none());
        // Shadow is still refreshed with the new raw value
        assert_eq!(f.logs.get("tank_1").await, Some(log_config(10.04, 600.0)));
    }

    #[tokio::test]
    async fn test_interval_change_retargets_both_cadences() {
        let f = fixture();
        f.logs.set("tank_1", log_config(10.0, 600.0)).await;
        let now = Instant::now();

        let outcome = f
            .engine
            .on_log_changed("tank_1", log_config(10.06, 600.0), now)
            .await;

        assert_eq!(
            outcome,
            LogChange::Retargeted {
                primary: Duration::from_secs_f64(10.06),
                sampling: Duration::from_secs(600),
            }
        );
        let state = f.scheduler.state("tank_1").await.unwrap();
        assert_eq!(state.next_primary, Some(now + Duration::from_secs_f64(10.06)));
        assert_eq!(state.next_sampling, Some(now + Duration::from_secs(600)));
        assert_eq!(f.logs.get("tank_1").await, Some(log_config(10.06, 600.0)));
    }

    #[tokio::test]
    async fn test_retarget_uses_defaults_for_missing_interval() {
        let f = fixture();
        f.logs.set("tank_1", log_config(10.0, 600.0)).await;
        let now = Instant::now();

        let doc = json!({"primary_log_interval": 30});
        let event = ChangeEvent::modified(ConfigCollection::LogIntervals, "tank_1", doc);
        assert!(f.engine.handle_event(event, now).await.is_none());

        let state = f.scheduler.state("tank_1").await.unwrap();
        assert_eq!(state.next_primary, Some(now + Duration::from_secs(30)));
        assert_eq!(state.next_sampling, Some(now + Duration::from_secs(43200)));
    }

    #[tokio::test]
    async fn test_added_and_removed_events_ignored() {
        let f = fixture();
        for kind in [ChangeKind::Added, ChangeKind::Removed] {
            let event = ChangeEvent {
                collection: ConfigCollection::Controls,
                entity_id: "system_1".into(),
                kind,
                document: json!({"target_water_level": 10}),
            };
            assert!(f.engine.handle_event(event, Instant::now()).await.is_none());
        }
        assert!(f.controls.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_fields_compare_as_absent() {
        let f = fixture();
        f.controls
            .set(
                "system_1",
                ControlSnapshot {
                    target_light_duration: Some(8.0),
                    ..Default::default()
                },
            )
            .await;

        let doc: Value = json!({"target_light_duration": 8.0, "target_water_level": "high"});
        let event = ChangeEvent::modified(ConfigCollection::Controls, "system_1", doc);
        assert!(f.engine.handle_event(event, Instant::now()).await.is_none());
    }
}
