//! Subscriber registry for lossy fan-out
//!
//! The registry holds the set of connected subscribers and delivers messages
//! to them without ever waiting on one. It backs both the frame hub (viewers)
//! and the signaling relay (peers).
//!
//! # Architecture
//!
//! ```text
//!                     Arc<SubscriberRegistry<M>>
//!                    ┌───────────────────────────┐
//!                    │ subscribers: HashMap<     │
//!                    │   ConnId,                 │
//!                    │   Arc<dyn Sink<M>>,       │
//!                    │ >                         │
//!                    └─────────────┬─────────────┘
//!                                  │ snapshot, then try_deliver()
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//!   mpsc::Sender ─► ws        mpsc::Sender ─► ws         RoomSink ─► store
//! ```
//!
//! # Delivery semantics
//!
//! A sink that is not ready (its queue is full) is skipped for this message.
//! A sink that fails (its connection is gone) is removed. Neither affects the
//! other subscribers. `unsubscribe` may run during a broadcast because the
//! broadcast iterates a snapshot, not the live map.

pub mod entry;
pub mod error;
pub mod sink;
pub mod store;

pub use entry::ConnId;
pub use error::SinkError;
pub use sink::Sink;
pub use store::{DeliveryReport, SubscriberRegistry};
