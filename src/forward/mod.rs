//! Forward syncer - drains the telemetry outbox into the remote store
//!
//! Each record is upserted under its timestamp, then flagged uploaded
//! locally. A failed upload leaves the record pending for the next sweep.
//! Sweeps and immediate forwards may overlap; re-forwarding a record only
//! overwrites the same remote document.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::model::{TelemetryKind, TelemetryRecord};
use crate::storage::{self, OutboxStore};
use crate::transport::RemoteStore;

/// Remote collection names per telemetry kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryCollections {
    pub main_tank: String,
    pub sampling_tank: String,
}

impl TelemetryCollections {
    pub fn collection_for(&self, kind: TelemetryKind) -> &str {
        match kind {
            TelemetryKind::MainTank => &self.main_tank,
            TelemetryKind::SamplingTank => &self.sampling_tank,
        }
    }
}

impl Default for TelemetryCollections {
    fn default() -> Self {
        Self {
            main_tank: "main_tank_data".to_string(),
            sampling_tank: "sampling_tank_data".to_string(),
        }
    }
}

/// Outcome of one backlog pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub forwarded: usize,
    /// Rows flipped to uploaded; lower than `forwarded` when an overlapping
    /// forward flagged them first
    pub flagged: usize,
}

pub struct ForwardSyncer {
    outbox: Arc<OutboxStore>,
    remote: Arc<dyn RemoteStore>,
    collections: TelemetryCollections,
    sweep_interval: Duration,
    stop_tx: watch::Sender<bool>,
}

impl ForwardSyncer {
    pub fn new(
        outbox: Arc<OutboxStore>,
        remote: Arc<dyn RemoteStore>,
        collections: TelemetryCollections,
        sweep_interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            outbox,
            remote,
            collections,
            sweep_interval,
            stop_tx,
        }
    }

    pub fn outbox(&self) -> &Arc<OutboxStore> {
        &self.outbox
    }

    /// Upload one record and flag it uploaded. Never fails; returns whether
    /// the record reached the remote store and was flagged.
    pub async fn try_forward(&self, record: &TelemetryRecord) -> bool {
        self.forward_record(record).await.is_some()
    }

    /// Returns the number of rows that flipped to uploaded, or `None` when
    /// the upload or the flag update failed.
    async fn forward_record(&self, record: &TelemetryRecord) -> Option<usize> {
        let collection = self.collections.collection_for(record.kind());
        let timestamp = record.timestamp();

        if let Err(e) = self
            .remote
            .upsert(collection, timestamp, record.to_document())
            .await
        {
            warn!(
                collection,
                timestamp,
                error = %e,
                "Forward failed, record kept for backlog"
            );
            return None;
        }

        let key = timestamp.to_string();
        match storage::blocking(&self.outbox, move |outbox| outbox.mark_uploaded(&key)).await {
            Ok(changed) => {
                debug!(collection, timestamp, changed, "Forwarded record");
                Some(changed)
            }
            Err(e) => {
                // Remote copy exists; the next sweep overwrites it harmlessly
                warn!(timestamp, error = %e, "Failed to flag record uploaded");
                None
            }
        }
    }

    /// Forward every pending record once.
    pub async fn sweep(&self) -> SweepReport {
        let pending = match storage::blocking(&self.outbox, |outbox| outbox.fetch_pending()).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read backlog");
                return SweepReport::default();
            }
        };

        if pending.is_empty() {
            return SweepReport::default();
        }

        let mut report = SweepReport::default();
        for record in pending.into_records() {
            report.attempted += 1;
            if let Some(changed) = self.forward_record(&record).await {
                report.forwarded += 1;
                report.flagged += changed;
            }
        }

        info!(
            attempted = report.attempted,
            forwarded = report.forwarded,
            flagged = report.flagged,
            "Backlog sweep finished"
        );
        report
    }

    /// Sweep on every interval until `stop` is called. The first sweep runs
    /// immediately.
    pub async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.sweep_interval.as_secs_f64(),
            "Backlog sweeper started"
        );

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = stop_rx.changed() => {}
            }
        }

        info!("Backlog sweeper stopped");
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}
