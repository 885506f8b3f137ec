//! Signaling relay implementation

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::registry::{ConnId, DeliveryReport, Sink, SubscriberRegistry};

use super::message::SignalMessage;

/// Default per-peer queue depth
///
/// Candidates arrive in bursts during gathering, so peers get more slack
/// than viewers.
pub const DEFAULT_PEER_QUEUE: usize = 64;

/// Forwards negotiation messages to every peer except the sender
pub struct SignalingRelay {
    peers: SubscriberRegistry<SignalMessage>,
}

impl SignalingRelay {
    /// Create a relay with no peers
    pub fn new() -> Self {
        Self {
            peers: SubscriberRegistry::new("peer"),
        }
    }

    /// Register a peer sink
    pub async fn subscribe(&self, sink: Arc<dyn Sink<SignalMessage>>) -> ConnId {
        self.peers.subscribe(sink).await
    }

    /// Register a channel-backed peer
    pub async fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> (ConnId, mpsc::Receiver<SignalMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.peers.subscribe(Arc::new(tx)).await;
        (id, rx)
    }

    /// Remove a peer (idempotent)
    pub async fn unsubscribe(&self, id: ConnId) -> bool {
        self.peers.unsubscribe(id).await
    }

    /// Forward `message` from `sender` to all other peers
    ///
    /// A no-op when the sender is alone.
    pub async fn relay(&self, sender: ConnId, message: SignalMessage) -> DeliveryReport {
        let report = self.peers.broadcast(&message, Some(sender)).await;

        tracing::debug!(
            from = %sender,
            kind = %message.kind,
            delivered = report.delivered,
            skipped = report.skipped,
            "Signaling message relayed"
        );

        report
    }

    /// Number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.peers.len().await
    }

    /// Disconnect every peer
    pub async fn close_all(&self) -> usize {
        self.peers.clear().await
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_offer_reaches_everyone_but_sender() {
        let relay = SignalingRelay::new();
        let (a, mut rx_a) = relay.subscribe_channel(8).await;
        let (_b, mut rx_b) = relay.subscribe_channel(8).await;
        let (_c, mut rx_c) = relay.subscribe_channel(8).await;

        let offer = SignalMessage::offer(json!({"type": "offer", "sdp": "v=0"}));
        let report = relay.relay(a, offer.clone()).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(rx_b.recv().await, Some(offer.clone()));
        assert_eq!(rx_c.recv().await, Some(offer));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lone_peer_is_noop() {
        let relay = SignalingRelay::new();
        let (a, mut rx_a) = relay.subscribe_channel(8).await;

        let report = relay.relay(a, SignalMessage::answer(json!({}))).await;

        assert_eq!(report, DeliveryReport::default());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_from_one_sender_keep_order() {
        let relay = SignalingRelay::new();
        let (a, _rx_a) = relay.subscribe_channel(8).await;
        let (_b, mut rx_b) = relay.subscribe_channel(8).await;

        for i in 0..5 {
            relay
                .relay(a, SignalMessage::ice_candidate(json!({"candidate": i})))
                .await;
        }

        for i in 0..5 {
            let msg = rx_b.recv().await.unwrap();
            assert_eq!(msg.payload["candidate"], i);
        }
    }

    #[tokio::test]
    async fn test_disconnected_peer_is_pruned() {
        let relay = SignalingRelay::new();
        let (a, _rx_a) = relay.subscribe_channel(8).await;
        let (_b, rx_b) = relay.subscribe_channel(8).await;
        drop(rx_b);

        let report = relay.relay(a, SignalMessage::offer(json!({}))).await;

        assert_eq!(report.removed, 1);
        assert_eq!(relay.peer_count().await, 1);
    }
}
