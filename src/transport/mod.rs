//! Collaborator seams - messaging transport and remote document store
//!
//! The core only talks to these traits. Concrete adapters:
//! - `memory`: in-process doubles for tests and dry runs
//! - `http`: REST document store client
//! - `stdio`: JSON-lines bridge to an external MQTT client
//! - `feed`: polling change feed over a `RemoteStore`

pub mod feed;
pub mod http;
pub mod memory;
pub mod stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::OutboundMessage;

/// Publishes device commands (at-least-once, QoS as carried by the message)
#[async_trait::async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Remote document store holding configuration and forwarded telemetry
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or fully overwrite `collection/doc_id`.
    async fn upsert(&self, collection: &str, doc_id: &str, document: Value)
        -> Result<(), RemoteError>;

    /// Every document currently in `collection`.
    async fn list(&self, collection: &str) -> Result<Vec<RemoteDocument>, RemoteError>;
}

/// A document and its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub data: Value,
}

/// Raw message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Remote store unreachable or refusing writes
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    #[error("Remote store rejected request: HTTP {0}")]
    Rejected(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Command could not be handed to the broker
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Publish failed: {0}")]
    Publish(String),
}
