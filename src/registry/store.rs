//! Subscriber registry implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::entry::ConnId;
use super::sink::Sink;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers that accepted the message
    pub delivered: usize,
    /// Subscribers that were not ready and missed the message
    pub skipped: usize,
    /// Subscribers that failed and were removed
    pub removed: usize,
}

/// Set of connected subscribers for messages of type `M`
///
/// Thread-safe via `RwLock`. Broadcasts hold the read lock only long enough
/// to snapshot the set, so connects and disconnects never wait on delivery.
pub struct SubscriberRegistry<M> {
    /// Map of connection ID to sink
    subscribers: RwLock<HashMap<ConnId, Arc<dyn Sink<M>>>>,

    /// Next connection ID to hand out
    next_id: AtomicU64,

    /// Subscriber kind, for logging ("viewer", "peer")
    kind: &'static str,
}

impl<M: Clone + Send + 'static> SubscriberRegistry<M> {
    /// Create an empty registry
    pub fn new(kind: &'static str) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            kind,
        }
    }

    /// Register a sink and return its connection ID
    pub async fn subscribe(&self, sink: Arc<dyn Sink<M>>) -> ConnId {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, sink);

        tracing::info!(
            kind = self.kind,
            conn = %id,
            subscribers = subscribers.len(),
            "Subscriber added"
        );

        id
    }

    /// Remove a subscriber
    ///
    /// Returns false if it was not registered (already removed).
    pub async fn unsubscribe(&self, id: ConnId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(&id).is_some();

        if removed {
            tracing::info!(
                kind = self.kind,
                conn = %id,
                subscribers = subscribers.len(),
                "Subscriber removed"
            );
        }

        removed
    }

    /// Check whether a connection is registered
    pub async fn contains(&self, id: ConnId) -> bool {
        self.subscribers.read().await.contains_key(&id)
    }

    /// Number of registered subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Check if there are no subscribers
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Drop every subscriber
    ///
    /// Dropping the sinks closes channel-backed transports, which ends their
    /// writer tasks. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        count
    }

    /// Deliver `message` to every ready subscriber except `except`
    ///
    /// Never waits on a subscriber. Failed subscribers are removed after the
    /// pass; the others still receive the message.
    pub async fn broadcast(&self, message: &M, except: Option<ConnId>) -> DeliveryReport {
        let snapshot: Vec<(ConnId, Arc<dyn Sink<M>>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .map(|(id, sink)| (*id, Arc::clone(sink)))
                .collect()
        };

        let mut report = DeliveryReport::default();
        let mut failed = Vec::new();

        for (id, sink) in snapshot {
            if sink.is_closed() {
                tracing::debug!(
                    kind = self.kind,
                    conn = %id,
                    "Subscriber closed, dropping"
                );
                failed.push(id);
                continue;
            }
            if !sink.is_ready() {
                report.skipped += 1;
                continue;
            }

            match sink.try_deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_fatal() => {
                    tracing::debug!(
                        kind = self.kind,
                        conn = %id,
                        error = %e,
                        "Delivery failed, dropping subscriber"
                    );
                    failed.push(id);
                }
                Err(_) => report.skipped += 1,
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in failed {
                if subscribers.remove(&id).is_some() {
                    report.removed += 1;
                }
            }
        }

        report
    }
}
