//! Application callbacks
//!
//! The session loop hands every dispatch to an [`EventHandler`]. Handlers run inline on
//! the receive loop, so a slow handler delays reading the next frame.

use crate::client::CloseReason;
use async_trait::async_trait;
use serde_json::Value;

/// An op 0 event after its sequence has been committed
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    /// `t`, e.g. `READY` or `MESSAGE_CREATE`
    pub name: Option<String>,
    pub sequence: Option<u64>,
    pub data: Value,
}

/// Receives gateway events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_dispatch(&self, _event: &DispatchEvent) {}

    /// Called once, after the session reached `Closed`
    async fn on_closed(&self, _reason: &CloseReason) {}
}

/// Default handler: logs what arrives
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn on_dispatch(&self, event: &DispatchEvent) {
        let name = event.name.as_deref().unwrap_or("<unnamed>");
        if name == "READY" {
            let session_id = event.data.get("session_id").and_then(Value::as_str);
            tracing::info!(
                session_id,
                seq = ?event.sequence,
                "Gateway session ready"
            );
        } else {
            tracing::debug!(event = name, seq = ?event.sequence, "Dispatch received");
        }
    }

    async fn on_closed(&self, reason: &CloseReason) {
        tracing::info!(reason = %reason, "Gateway session closed");
    }
}
