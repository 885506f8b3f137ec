//! Delivery capability for one subscriber

use tokio::sync::mpsc;

use super::error::SinkError;

/// Something that accepts messages for one subscriber without blocking
///
/// Implementations must return immediately; a sink that cannot take the
/// message right now reports [`SinkError::Full`] (or `false` from
/// [`is_ready`](Sink::is_ready)) instead of waiting.
pub trait Sink<M>: Send + Sync {
    /// Whether the transport is open and can take a message right now
    fn is_ready(&self) -> bool;

    /// Whether the transport is gone for good
    fn is_closed(&self) -> bool {
        false
    }

    /// Hand a message to the transport
    fn try_deliver(&self, message: M) -> Result<(), SinkError>;
}

/// Bounded channel drained by a per-connection writer task
///
/// The channel capacity is the subscriber's tolerance for lag: once it is
/// full, further messages are dropped until the writer catches up.
impl<M: Send> Sink<M> for mpsc::Sender<M> {
    fn is_ready(&self) -> bool {
        !mpsc::Sender::is_closed(self) && self.capacity() > 0
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }

    fn try_deliver(&self, message: M) -> Result<(), SinkError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
