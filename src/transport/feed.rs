//! Polling change feed
//!
//! Turns periodic full listings of the configuration collections into
//! per-document change events. The first listing of each collection should
//! be handed to `prime` (normally the cold-start read) so that startup does
//! not replay every document as an addition.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{RemoteDocument, RemoteStore};
use crate::sync::{ChangeEvent, ChangeKind, ConfigCollection};

pub struct PollingChangeFeed {
    remote: Arc<dyn RemoteStore>,
    collections: Vec<(String, ConfigCollection)>,
    poll_interval: Duration,
    seen: HashMap<ConfigCollection, BTreeMap<String, Value>>,
}

impl PollingChangeFeed {
    /// `collections` maps remote collection names to the config they hold.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        collections: Vec<(String, ConfigCollection)>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            remote,
            collections,
            poll_interval,
            seen: HashMap::new(),
        }
    }

    /// Record a listing as the baseline without emitting events.
    pub fn prime(&mut self, collection: ConfigCollection, documents: &[RemoteDocument]) {
        let baseline = documents
            .iter()
            .map(|doc| (doc.id.clone(), doc.data.clone()))
            .collect();
        self.seen.insert(collection, baseline);
    }

    /// List every watched collection once and report what changed since the
    /// previous listing. A collection that cannot be listed is skipped and
    /// keeps its baseline.
    pub async fn poll(&mut self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();

        for (name, collection) in &self.collections {
            let documents = match self.remote.list(name).await {
                Ok(documents) => documents,
                Err(e) => {
                    warn!(collection = %name, error = %e, "Change feed listing failed");
                    continue;
                }
            };

            let current: BTreeMap<String, Value> = documents
                .into_iter()
                .map(|doc| (doc.id, doc.data))
                .collect();
            let previous = self.seen.entry(*collection).or_default();
            events.extend(diff_listing(*collection, previous, &current));
            *previous = current;
        }

        events
    }

    /// Poll until shutdown, sending events to `tx`.
    pub async fn run(mut self, tx: mpsc::Sender<ChangeEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the baseline is already primed
        ticker.tick().await;

        info!(
            interval_secs = self.poll_interval.as_secs_f64(),
            "Change feed started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    for event in self.poll().await {
                        debug!(
                            entity_id = %event.entity_id,
                            kind = ?event.kind,
                            "Config change detected"
                        );
                        if tx.send(event).await.is_err() {
                            info!("Change receiver dropped, stopping feed");
                            return;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Change feed stopped");
    }
}

/// Events that turn `previous` into `current`, ordered by document id.
pub fn diff_listing(
    collection: ConfigCollection,
    previous: &BTreeMap<String, Value>,
    current: &BTreeMap<String, Value>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (id, data) in current {
        let kind = match previous.get(id) {
            None => ChangeKind::Added,
            Some(old) if old != data => ChangeKind::Modified,
            Some(_) => continue,
        };
        events.push(ChangeEvent {
            collection,
            entity_id: id.clone(),
            kind,
            document: data.clone(),
        });
    }

    for (id, data) in previous {
        if !current.contains_key(id) {
            events.push(ChangeEvent {
                collection,
                entity_id: id.clone(),
                kind: ChangeKind::Removed,
                document: data.clone(),
            });
        }
    }

    events
}
