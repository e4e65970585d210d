//! Broadcast hub (§4.H): best-effort, evict-on-failure fan-out to
//! subscribed listeners. A slow or disconnected subscriber must never
//! stall the pipeline.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::model::Alert;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BroadcastMessage {
    Alert(Alert),
    Tick { processed: u64 },
    Error { message: String },
}

/// Wraps a `tokio::sync::broadcast::Sender`, serializing each message once
/// and treating every subscriber as best-effort: a lagged or closed
/// receiver is simply not retried.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<String>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Serializes `message` once and sends it to every subscriber. If there
    /// are no subscribers (`SendError`), this is not an error condition —
    /// matches the original hub's no-op-when-empty behavior.
    pub fn publish(&self, message: &BroadcastMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast message");
                return;
            }
        };
        let _ = self.sender.send(payload);
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024)
    }
}
