//! Downstream queue seam.
//!
//! Publication is at-least-once and fire-and-forget: `publish` hands the batch
//! off and returns immediately, and the walker never waits for an
//! acknowledgement. A crash between a publish and the following checkpoint
//! write replays that batch on restart, so consumers must tolerate duplicates.

pub mod http;

pub use http::HttpQueuePublisher;

use serde::Serialize;

/// Ordered batch of signature ids, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureBatch {
    pub network: String,
    pub signatures: Vec<String>,
}

impl SignatureBatch {
    pub fn new(network: impl Into<String>, signatures: Vec<String>) -> Self {
        Self {
            network: network.into(),
            signatures,
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

pub trait QueuePublisher: Send + Sync {
    /// Hands `batch` to the queue without blocking the caller. Delivery
    /// failures are reported by the implementation, never to the caller.
    fn publish(&self, batch: SignatureBatch);
}

/// Publisher used in debug mode: batches are logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPublisher;

impl QueuePublisher for DiscardPublisher {
    fn publish(&self, batch: SignatureBatch) {
        tracing::debug!(
            network = %batch.network,
            count = batch.len(),
            "debug mode; discarding signature batch"
        );
    }
}
