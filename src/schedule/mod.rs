//! Dual-interval telemetry scheduler
//!
//! Each system has two independent timers, primary and sampling. A timer is
//! armed the first time the scheduler sees the system, at `now + interval`,
//! so the first pull waits a full interval. When a timer expires the
//! scheduler emits a pull command and rearms it at `firing instant +
//! interval`, so late ticks accumulate as drift.
//!
//! Intervals are read from the log-config shadow on every tick, so a config
//! change takes effect at the next rearm even without a retarget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::model::{Cadence, IntervalDefaults, LogConfig, PullCommand};
use crate::storage::ShadowStore;
use crate::transport::CommandPublisher;

/// Upper bound on how far out a deadline is placed, for intervals large
/// enough to overflow `Instant`.
const MAX_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Deadlines for one system. `None` is an unscheduled timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub next_primary: Option<Instant>,
    pub next_sampling: Option<Instant>,
}

impl ScheduleState {
    pub fn deadline(&self, cadence: Cadence) -> Option<Instant> {
        match cadence {
            Cadence::Primary => self.next_primary,
            Cadence::Sampling => self.next_sampling,
        }
    }

    fn deadline_mut(&mut self, cadence: Cadence) -> &mut Option<Instant> {
        match cadence {
            Cadence::Primary => &mut self.next_primary,
            Cadence::Sampling => &mut self.next_sampling,
        }
    }
}

/// Seconds until each deadline, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub entity_id: String,
    pub primary_due_in_secs: Option<f64>,
    pub sampling_due_in_secs: Option<f64>,
}

/// Emits GET_PRIMARY / GET_SAMPLING pulls per system on their own cadences
pub struct DualIntervalScheduler {
    logs: Arc<ShadowStore<LogConfig>>,
    defaults: IntervalDefaults,
    states: Mutex<HashMap<String, ScheduleState>>,
    tick_period: Duration,
    stop_tx: watch::Sender<bool>,
}

impl DualIntervalScheduler {
    pub fn new(
        logs: Arc<ShadowStore<LogConfig>>,
        defaults: IntervalDefaults,
        tick_period: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            logs,
            defaults,
            states: Mutex::new(HashMap::new()),
            tick_period,
            stop_tx,
        }
    }

    pub fn defaults(&self) -> &IntervalDefaults {
        &self.defaults
    }

    /// Examine every known system's timers against `now`.
    ///
    /// Returns the pull commands for expired timers; the caller publishes
    /// them after the deadline lock has been released.
    pub async fn tick(&self, now: Instant) -> Vec<PullCommand> {
        let systems = self.logs.entities().await;
        let mut states = self.states.lock().await;
        let mut fired = Vec::new();

        for (entity_id, config) in systems {
            let state = states.entry(entity_id.clone()).or_default();
            for cadence in Cadence::ALL {
                let period = config.interval(cadence, &self.defaults);
                let deadline = state.deadline_mut(cadence);
                let due = *deadline.get_or_insert_with(|| deadline_after(now, period));
                if now >= due {
                    fired.push(PullCommand {
                        entity_id: entity_id.clone(),
                        cadence,
                    });
                    *deadline = Some(deadline_after(now, period));
                }
            }
        }

        fired
    }

    /// Overwrite one timer's deadline, arming it if it was unscheduled.
    pub async fn retarget(&self, entity_id: &str, cadence: Cadence, deadline: Instant) {
        let mut states = self.states.lock().await;
        let state = states.entry(entity_id.to_string()).or_default();
        *state.deadline_mut(cadence) = Some(deadline);
        debug!(entity_id, ?cadence, "Retargeted schedule");
    }

    pub async fn state(&self, entity_id: &str) -> Option<ScheduleState> {
        self.states.lock().await.get(entity_id).copied()
    }

    /// Time left on every armed timer, ordered by system id
    pub async fn snapshot(&self, now: Instant) -> Vec<ScheduleView> {
        let states = self.states.lock().await;
        let due_in = |deadline: Option<Instant>| {
            deadline.map(|at| at.saturating_duration_since(now).as_secs_f64())
        };

        let mut views: Vec<ScheduleView> = states
            .iter()
            .map(|(entity_id, state)| ScheduleView {
                entity_id: entity_id.clone(),
                primary_due_in_secs: due_in(state.next_primary),
                sampling_due_in_secs: due_in(state.next_sampling),
            })
            .collect();
        views.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        views
    }

    /// Run the tick loop until `stop` is called.
    ///
    /// A stop request is observed between ticks; a tick in progress always
    /// finishes publishing.
    pub async fn run(&self, publisher: Arc<dyn CommandPublisher>) {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tick_ms = self.tick_period.as_millis() as u64, "Scheduler started");

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    for command in self.tick(Instant::now()).await {
                        let entity_id = command.entity_id.clone();
                        let cadence = command.cadence;
                        match publisher.publish(command.into_message()).await {
                            Ok(()) => info!(
                                entity_id = %entity_id,
                                command = cadence.command_type(),
                                "Timer reached, pull requested"
                            ),
                            Err(e) => warn!(
                                entity_id = %entity_id,
                                command = cadence.command_type(),
                                error = %e,
                                "Failed to publish pull command"
                            ),
                        }
                    }
                }
                _ = stop_rx.changed() => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// Ask the tick loop to exit.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

/// `now + period`, clamped so huge intervals cannot overflow `Instant`
pub(crate) fn deadline_after(now: Instant, period: Duration) -> Instant {
    now.checked_add(period.min(MAX_HORIZON)).unwrap_or(now)
}
