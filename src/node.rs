//! Node orchestrator
//!
//! Owns the shadow stores, scheduler, diff engine and forward syncer, and
//! drives four independent loops: change consumption, telemetry ingestion,
//! the scheduler tick loop and the backlog sweep loop.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::forward::ForwardSyncer;
use crate::model::{ControlCommand, ControlSnapshot, LogConfig, PayloadError, TelemetryRecord};
use crate::schedule::{DualIntervalScheduler, ScheduleView};
use crate::storage::{self, OutboxStore, PendingCounts, ShadowStore};
use crate::sync::{ChangeDiffEngine, ChangeEvent};
use crate::transport::{
    CommandPublisher, InboundMessage, RemoteDocument, RemoteError, RemoteStore,
};

/// Listings read during cold start, for priming a change feed
#[derive(Debug, Clone, Default)]
pub struct ColdStart {
    pub controls: Vec<RemoteDocument>,
    pub logs: Vec<RemoteDocument>,
    pub commands_published: usize,
}

/// What happened to one inbound telemetry message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored locally and uploaded
    Forwarded,
    /// Stored locally; left for the backlog sweep
    Buffered,
    /// Not stored
    Dropped,
}

/// Node summary for the status API
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub version: String,
    pub control_entities: Vec<String>,
    pub log_entities: Vec<String>,
    pub pending: PendingCounts,
    pub uptime_secs: u64,
}

pub struct Node {
    config: Config,
    controls: Arc<ShadowStore<ControlSnapshot>>,
    logs: Arc<ShadowStore<LogConfig>>,
    scheduler: Arc<DualIntervalScheduler>,
    engine: ChangeDiffEngine,
    forwarder: Arc<ForwardSyncer>,
    publisher: Arc<dyn CommandPublisher>,
    remote: Arc<dyn RemoteStore>,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl Node {
    pub fn new(
        config: &Config,
        outbox: Arc<OutboxStore>,
        publisher: Arc<dyn CommandPublisher>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let controls = Arc::new(ShadowStore::new());
        let logs = Arc::new(ShadowStore::new());
        let scheduler = Arc::new(DualIntervalScheduler::new(
            logs.clone(),
            config.schedule.interval_defaults(),
            config.schedule.tick_period(),
        ));
        let engine = ChangeDiffEngine::new(controls.clone(), logs.clone(), scheduler.clone());
        let forwarder = Arc::new(ForwardSyncer::new(
            outbox,
            remote.clone(),
            config.remote.telemetry_collections(),
            config.outbox.backlog_interval(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: config.clone(),
            controls,
            logs,
            scheduler,
            engine,
            forwarder,
            publisher,
            remote,
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<DualIntervalScheduler> {
        &self.scheduler
    }

    pub fn forwarder(&self) -> &Arc<ForwardSyncer> {
        &self.forwarder
    }

    pub fn controls(&self) -> &Arc<ShadowStore<ControlSnapshot>> {
        &self.controls
    }

    pub fn logs(&self) -> &Arc<ShadowStore<LogConfig>> {
        &self.logs
    }

    /// Read both configuration collections, prime the shadows and push a
    /// FULL_SYNC to every known system.
    ///
    /// A collection that cannot be read is treated as empty. The daemon uses
    /// `cold_start_with_retry` instead.
    pub async fn cold_start(&self) -> ColdStart {
        let controls = self.list_or_empty(&self.config.remote.control_collection).await;
        let logs = self.list_or_empty(&self.config.remote.log_collection).await;
        self.apply_cold_start(controls, logs).await
    }

    /// Cold start once both collections can be listed, retrying with
    /// exponential backoff while the remote store is unreachable.
    ///
    /// Returns `None` if shutdown is requested before a listing succeeds.
    pub async fn cold_start_with_retry(&self) -> Option<ColdStart> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let max_delay = self.config.remote.retry_max();
        let mut delay = self.config.remote.retry_initial().min(max_delay);
        let mut attempt: u32 = 1;

        loop {
            if *shutdown_rx.borrow_and_update() {
                return None;
            }

            match self.list_configuration().await {
                Ok((controls, logs)) => {
                    if attempt > 1 {
                        info!(attempt, "Remote store reachable, running cold start");
                    }
                    return Some(self.apply_cold_start(controls, logs).await);
                }
                Err(e) => warn!(
                    attempt,
                    retry_in_secs = delay.as_secs_f64(),
                    error = %e,
                    "Cold start listing failed, retrying"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
            delay = delay.saturating_mul(2).min(max_delay);
            attempt += 1;
        }
    }

    async fn list_configuration(
        &self,
    ) -> Result<(Vec<RemoteDocument>, Vec<RemoteDocument>), RemoteError> {
        let controls = self.remote.list(&self.config.remote.control_collection).await?;
        let logs = self.remote.list(&self.config.remote.log_collection).await?;
        Ok((controls, logs))
    }

    async fn apply_cold_start(
        &self,
        controls: Vec<RemoteDocument>,
        logs: Vec<RemoteDocument>,
    ) -> ColdStart {
        let control_docs = controls
            .iter()
            .map(|doc| (doc.id.clone(), ControlSnapshot::from_document(&doc.data)))
            .collect();
        let log_docs = logs
            .iter()
            .map(|doc| (doc.id.clone(), LogConfig::from_document(&doc.data)))
            .collect();

        let commands = self.engine.cold_start_sync(control_docs, log_docs).await;
        let mut commands_published = 0;
        for command in commands {
            if self.publish(command).await {
                commands_published += 1;
            }
        }

        info!(
            systems = controls.len(),
            log_configs = logs.len(),
            commands_published,
            "Cold start sync complete"
        );

        ColdStart {
            controls,
            logs,
            commands_published,
        }
    }

    async fn list_or_empty(&self, collection: &str) -> Vec<RemoteDocument> {
        match self.remote.list(collection).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(collection, error = %e, "Cold start listing failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Apply one configuration change and publish any resulting command.
    pub async fn handle_change(&self, event: ChangeEvent) {
        if let Some(command) = self.engine.handle_event(event, Instant::now()).await {
            self.publish(command).await;
        }
    }

    /// Persist one telemetry message, then try to forward it immediately.
    pub async fn ingest(&self, message: InboundMessage) -> IngestOutcome {
        let record = match self.parse_telemetry(&message) {
            Ok(record) => record,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping malformed telemetry");
                return IngestOutcome::Dropped;
            }
        };

        let stored = record.clone();
        let persisted =
            storage::blocking(self.forwarder.outbox(), move |outbox| outbox.persist(&stored)).await;
        if let Err(e) = persisted {
            error!(
                timestamp = record.timestamp(),
                error = %e,
                "Failed to persist telemetry, record lost"
            );
            return IngestOutcome::Dropped;
        }

        if self.forwarder.try_forward(&record).await {
            IngestOutcome::Forwarded
        } else {
            IngestOutcome::Buffered
        }
    }

    fn parse_telemetry(&self, message: &InboundMessage) -> Result<TelemetryRecord, PayloadError> {
        let kind = self
            .config
            .broker
            .kind_for_topic(&message.topic)
            .ok_or_else(|| PayloadError::UnknownTopic(message.topic.clone()))?;
        TelemetryRecord::parse(kind, &message.payload)
    }

    async fn publish(&self, command: ControlCommand) -> bool {
        let entity_id = command.entity_id().to_string();
        match self.publisher.publish(command.into_message()).await {
            Ok(()) => {
                debug!(entity_id = %entity_id, "Published control command");
                true
            }
            Err(e) => {
                warn!(entity_id = %entity_id, error = %e, "Failed to publish control command");
                false
            }
        }
    }

    /// Run the scheduler, sweep and ingestion loops and consume changes
    /// until `shutdown` is called or both input channels close.
    ///
    /// Ingestion runs in its own task so a slow upload never delays a
    /// configuration change.
    pub async fn run(
        self: Arc<Self>,
        mut changes: mpsc::Receiver<ChangeEvent>,
        inbound: mpsc::Receiver<InboundMessage>,
    ) {
        let scheduler_task = {
            let scheduler = self.scheduler.clone();
            let publisher = self.publisher.clone();
            tokio::spawn(async move { scheduler.run(publisher).await })
        };
        let sweep_task = {
            let forwarder = self.forwarder.clone();
            tokio::spawn(async move { forwarder.run().await })
        };
        let mut ingest_task = {
            let node = self.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move { node.ingest_loop(inbound, shutdown_rx).await })
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut changes_open = true;
        let mut ingest_done = false;

        info!(node_id = %self.config.node.id, "Node running");

        while changes_open || !ingest_done {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                event = changes.recv(), if changes_open => match event {
                    Some(event) => self.handle_change(event).await,
                    None => {
                        info!("Change feed closed");
                        changes_open = false;
                    }
                },
                joined = &mut ingest_task, if !ingest_done => {
                    ingest_done = true;
                    if let Err(e) = joined {
                        error!(task = "ingest", error = %e, "Loop task failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.scheduler.stop();
        self.forwarder.stop();
        if !ingest_done {
            // Finishes the message in hand, then sees the shutdown flag
            if let Err(e) = ingest_task.await {
                error!(task = "ingest", error = %e, "Loop task failed");
            }
        }
        for (name, task) in [("scheduler", scheduler_task), ("sweeper", sweep_task)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Loop task failed");
            }
        }

        info!("Node stopped");
    }

    async fn ingest_loop(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        let outcome = self.ingest(message).await;
                        debug!(?outcome, "Telemetry ingested");
                    }
                    None => {
                        info!("Telemetry input closed");
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Signal `run` and everything waiting on `subscribe_shutdown` to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub async fn status(&self) -> NodeStatus {
        let counted = storage::blocking(self.forwarder.outbox(), |outbox| outbox.pending_counts());
        let pending = match counted.await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Failed to count backlog");
                PendingCounts::default()
            }
        };

        NodeStatus {
            node_id: self.config.node.id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            control_entities: self.controls.ids().await,
            log_entities: self.logs.ids().await,
            pending,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    pub async fn schedule(&self) -> Vec<ScheduleView> {
        self.scheduler.snapshot(Instant::now()).await
    }
}
