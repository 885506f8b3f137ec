//! Sink error types
//!
//! Error types for delivering a message to a single subscriber.

/// Error type for sink delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Subscriber's queue is full; the message is dropped for it
    #[error("subscriber queue full")]
    Full,
    /// Subscriber's connection is gone
    #[error("subscriber closed")]
    Closed,
    /// Subscriber's transport rejected the message
    #[error("transport error: {0}")]
    Transport(String),
}

impl SinkError {
    /// Whether the subscriber should be dropped from the registry
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SinkError::Full)
    }
}
