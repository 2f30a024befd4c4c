//! JSON-lines bridge to an external MQTT client
//!
//! Lets the daemon sit behind any broker client that can pipe messages, e.g.
//! `mosquitto_sub -v ... | canopy-node | publisher`.
//!
//! Inbound lines:  `{"topic": "main_tank/data", "payload": {...}}`
//! Outbound lines: `{"topic": "...", "payload": {...}, "qos": 1, "retain": false}`

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::{CommandPublisher, InboundMessage, TransportError};
use crate::model::OutboundMessage;

/// Writes each outbound message as one JSON line
pub struct LinePublisher<W> {
    out: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> LinePublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl LinePublisher<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandPublisher for LinePublisher<W> {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_vec(&message).map_err(|e| TransportError::Publish(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    payload: Value,
}

/// Parse one bridge line. String payloads are passed through as raw bytes.
pub fn parse_line(line: &str) -> Result<InboundMessage, serde_json::Error> {
    let InboundLine { topic, payload } = serde_json::from_str(line)?;
    let payload = match payload {
        Value::String(raw) => raw.into_bytes(),
        other => serde_json::to_vec(&other)?,
    };
    Ok(InboundMessage { topic, payload })
}

/// Forward bridge lines from `reader` into `tx` until EOF, shutdown, or the
/// receiver goes away. Unparseable lines are logged and skipped.
pub async fn read_inbound<R: AsyncBufRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = reader.lines();
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Ok(message) => {
                            debug!(topic = %message.topic, "Inbound message");
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed bridge line"),
                    }
                }
                Ok(None) => {
                    info!("Inbound bridge reached end of input");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Inbound bridge read failed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
