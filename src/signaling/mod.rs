//! WebRTC signaling relay
//!
//! Peers that want to share the feed directly exchange session descriptions
//! and ICE candidates through the relay. The relay forwards each message to
//! every other connected peer and keeps no session state of its own.
//!
//! Peers that are not connected at the same time negotiate through a room
//! store instead. Both paths carry the same [`SignalMessage`] shape, and a
//! [`RoomSink`] lets the store sit on the relay as just another subscriber.

pub mod message;
pub mod relay;
pub mod room;

pub use message::{SignalError, SignalKind, SignalMessage};
pub use relay::{SignalingRelay, DEFAULT_PEER_QUEUE};
pub use room::{MemoryRoomStore, PeerRole, Room, RoomSink, RoomStore};
