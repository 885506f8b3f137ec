//! Broadcast hub implementation

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::registry::{ConnId, DeliveryReport, Sink, SubscriberRegistry};

use super::frame::Frame;

/// Default per-viewer queue depth
///
/// Small on purpose: a viewer more than a couple of frames behind should
/// skip ahead rather than watch stale video.
pub const DEFAULT_VIEWER_QUEUE: usize = 2;

/// Distributes frames to every connected viewer
pub struct BroadcastHub {
    viewers: SubscriberRegistry<Frame>,
}

impl BroadcastHub {
    /// Create a hub with no viewers
    pub fn new() -> Self {
        Self {
            viewers: SubscriberRegistry::new("viewer"),
        }
    }

    /// Register a viewer sink
    pub async fn subscribe(&self, sink: Arc<dyn Sink<Frame>>) -> ConnId {
        self.viewers.subscribe(sink).await
    }

    /// Register a channel-backed viewer
    ///
    /// Returns the connection ID and the receiving end, which the caller
    /// drains into its transport.
    pub async fn subscribe_channel(&self, capacity: usize) -> (ConnId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.viewers.subscribe(Arc::new(tx)).await;
        (id, rx)
    }

    /// Remove a viewer (idempotent)
    pub async fn unsubscribe(&self, id: ConnId) -> bool {
        self.viewers.unsubscribe(id).await
    }

    /// Send a frame to all ready viewers
    pub async fn publish(&self, frame: Frame) -> DeliveryReport {
        let report = self.viewers.broadcast(&frame, None).await;

        tracing::trace!(
            sequence = frame.sequence,
            size = frame.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            removed = report.removed,
            "Frame published"
        );

        report
    }

    /// Number of connected viewers
    pub async fn viewer_count(&self) -> usize {
        self.viewers.len().await
    }

    /// Disconnect every viewer
    pub async fn close_all(&self) -> usize {
        self.viewers.clear().await
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
