//! Observation events raised to the host application.
//!
//! Delivery is fire-and-forget: the host hands the server an unbounded sender
//! and may drop the receiver at any time without affecting request handling.

use {tokio::sync::mpsc, tracing::trace};

/// Events the host can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Both listeners have been scheduled.
    Ready,
    /// A request failed: auth (403), routing (400), handler error (500), or an
    /// untransmissible payload. `endpoint` is empty when unknown.
    Error { endpoint: String, message: String },
}

/// Handle used internally to emit events. Cheap to clone; a missing or closed
/// receiver makes every emit a no-op.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything (host did not subscribe).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &self.tx {
            // The host may have dropped the receiver; that's fine.
            let _ = tx.send(event);
        } else {
            trace!(?event, "no event sink attached, dropping");
        }
    }

    /// Convenience for the error event shape.
    pub fn error(&self, endpoint: &str, message: impl Into<String>) {
        self.emit(ServerEvent::Error {
            endpoint: endpoint.to_string(),
            message: message.into(),
        });
    }
}
