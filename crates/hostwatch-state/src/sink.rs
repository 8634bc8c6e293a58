//! Event sinks — where transition events go.
//!
//! Appending is fire-and-forget: the store calls `append` while holding
//! its lock, so implementations must never block.

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::TransitionEvent;

/// Receives transition events from the state store and the reconciler.
pub trait EventSink: Send + Sync {
    fn append(&self, event: TransitionEvent);
}

/// Forwards events over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransitionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn append(&self, event: TransitionEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(hostname = %e.0.hostname, "event receiver closed, dropping event");
        }
    }
}
