//! In-memory collaborators

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::{CommandPublisher, RemoteDocument, RemoteError, RemoteStore, TransportError};
use crate::model::OutboundMessage;

/// Document store kept in memory. Can be switched offline to simulate an
/// outage.
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Seed a document without counting it as a write
    pub async fn insert(&self, collection: &str, doc_id: &str, document: Value) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(doc_id.to_string(), document);
    }

    pub async fn remove(&self, collection: &str, doc_id: &str) {
        if let Some(docs) = self.collections.write().await.get_mut(collection) {
            docs.remove(doc_id);
        }
    }

    pub async fn document(&self, collection: &str, doc_id: &str) -> Option<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Successful upserts so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unreachable("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        collection: &str,
        doc_id: &str,
        document: Value,
    ) -> Result<(), RemoteError> {
        self.check_online()?;
        self.insert(collection, doc_id, document).await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<RemoteDocument>, RemoteError> {
        self.check_online()?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| RemoteDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Publisher that records every message instead of sending it
pub struct RecordingPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
    closed: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Make subsequent publishes fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().await.clone()
    }

    /// Drain everything recorded so far
    pub async fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.messages.lock().await)
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.messages.lock().await.push(message);
        Ok(())
    }
}
