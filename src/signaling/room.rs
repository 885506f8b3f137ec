//! Room store for asynchronous negotiation
//!
//! When the sharing peer and the joining peer are not connected at the same
//! time, the negotiation is parked in a room record:
//!
//! ```text
//! rooms/<id>
//!   offer             (set by host)
//!   answer            (set by client)
//!   hostCandidates    (append-only, host -> client)
//!   clientCandidates  (append-only, client -> host)
//! ```
//!
//! The production store is an external document database; [`RoomStore`] is
//! its interface and [`MemoryRoomStore`] an in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{Sink, SinkError};

use super::message::{SignalError, SignalKind, SignalMessage};

/// Which side of the negotiation wrote a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// The peer sharing the feed (creates the offer)
    Host,
    /// The peer joining the room (creates the answer)
    Client,
}

impl PeerRole {
    /// The other side of the negotiation
    pub fn peer(self) -> Self {
        match self {
            PeerRole::Host => PeerRole::Client,
            PeerRole::Client => PeerRole::Host,
        }
    }
}

/// One room's negotiation record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default)]
    pub host_candidates: Vec<Value>,
    #[serde(default)]
    pub client_candidates: Vec<Value>,
}

impl Room {
    /// Candidates written by `role`
    pub fn candidates(&self, role: PeerRole) -> &[Value] {
        match role {
            PeerRole::Host => &self.host_candidates,
            PeerRole::Client => &self.client_candidates,
        }
    }

    /// Messages waiting for `reader`, in the shape the relay delivers them
    ///
    /// A client reads the offer and the host's candidates; a host reads the
    /// answer and the client's candidates.
    pub fn messages_for(&self, reader: PeerRole) -> Vec<SignalMessage> {
        let description = match reader {
            PeerRole::Client => self.offer.clone().map(SignalMessage::offer),
            PeerRole::Host => self.answer.clone().map(SignalMessage::answer),
        };

        description
            .into_iter()
            .chain(
                self.candidates(reader.peer())
                    .iter()
                    .cloned()
                    .map(SignalMessage::ice_candidate),
            )
            .collect()
    }
}

/// Interface of the room document store
pub trait RoomStore: Send + Sync {
    /// Store the host's offer, creating the room if needed
    fn set_offer(&self, room: &str, offer: Value) -> Result<(), SignalError>;

    /// Store the client's answer; the room must already hold an offer
    fn set_answer(&self, room: &str, answer: Value) -> Result<(), SignalError>;

    /// Append a candidate written by `role`, creating the room if needed
    fn push_candidate(&self, room: &str, role: PeerRole, candidate: Value)
        -> Result<(), SignalError>;

    /// Snapshot of a room
    fn room(&self, room: &str) -> Option<Room>;

    /// Delete a room; returns false if it did not exist
    fn remove_room(&self, room: &str) -> bool;

    /// The room's offer, if any
    fn offer(&self, room: &str) -> Option<Value> {
        self.room(room).and_then(|r| r.offer)
    }

    /// The room's answer, if any
    fn answer(&self, room: &str) -> Option<Value> {
        self.room(room).and_then(|r| r.answer)
    }

    /// Candidates written by `role`
    fn candidates(&self, room: &str, role: PeerRole) -> Vec<Value> {
        self.room(room)
            .map(|r| r.candidates(role).to_vec())
            .unwrap_or_default()
    }
}

/// In-memory room store
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, Room>>,
}

impl MemoryRoomStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms
    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        // Every mutation is a single write, so a poisoned map is still whole
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoomStore for MemoryRoomStore {
    fn set_offer(&self, room: &str, offer: Value) -> Result<(), SignalError> {
        self.rooms().entry(room.to_string()).or_default().offer = Some(offer);
        Ok(())
    }

    fn set_answer(&self, room: &str, answer: Value) -> Result<(), SignalError> {
        let mut rooms = self.rooms();
        match rooms.get_mut(room) {
            Some(entry) if entry.offer.is_some() => {
                entry.answer = Some(answer);
                Ok(())
            }
            _ => Err(SignalError::RoomNotFound(room.to_string())),
        }
    }

    fn push_candidate(
        &self,
        room: &str,
        role: PeerRole,
        candidate: Value,
    ) -> Result<(), SignalError> {
        let mut rooms = self.rooms();
        let entry = rooms.entry(room.to_string()).or_default();
        match role {
            PeerRole::Host => entry.host_candidates.push(candidate),
            PeerRole::Client => entry.client_candidates.push(candidate),
        }
        Ok(())
    }

    fn room(&self, room: &str) -> Option<Room> {
        self.rooms().get(room).cloned()
    }

    fn remove_room(&self, room: &str) -> bool {
        self.rooms().remove(room).is_some()
    }
}

/// Relay subscriber that parks messages in a room
///
/// Subscribed on behalf of an absent peer: everything the connected peer
/// (`author`) sends through the relay is written to the room, where the
/// absent peer picks it up later with [`Room::messages_for`].
pub struct RoomSink {
    store: Arc<dyn RoomStore>,
    room: String,
    author: PeerRole,
}

impl RoomSink {
    /// Create a sink writing `author`'s messages into `room`
    pub fn new(store: Arc<dyn RoomStore>, room: impl Into<String>, author: PeerRole) -> Self {
        Self {
            store,
            room: room.into(),
            author,
        }
    }
}

impl Sink<SignalMessage> for RoomSink {
    fn is_ready(&self) -> bool {
        true
    }

    fn try_deliver(&self, message: SignalMessage) -> Result<(), SinkError> {
        let result = match message.kind {
            SignalKind::Offer => self.store.set_offer(&self.room, message.payload),
            SignalKind::Answer => self.store.set_answer(&self.room, message.payload),
            SignalKind::IceCandidate => {
                self.store
                    .push_candidate(&self.room, self.author, message.payload)
            }
        };

        result.map_err(|e| SinkError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::signaling::SignalingRelay;

    use super::*;

    #[test]
    fn test_offer_answer_candidates() {
        let store = MemoryRoomStore::new();

        store.set_offer("r1", json!({"sdp": "offer"})).unwrap();
        store
            .push_candidate("r1", PeerRole::Host, json!({"candidate": "h1"}))
            .unwrap();
        store.set_answer("r1", json!({"sdp": "answer"})).unwrap();
        store
            .push_candidate("r1", PeerRole::Client, json!({"candidate": "c1"}))
            .unwrap();

        assert_eq!(store.offer("r1"), Some(json!({"sdp": "offer"})));
        assert_eq!(store.answer("r1"), Some(json!({"sdp": "answer"})));
        assert_eq!(store.candidates("r1", PeerRole::Host).len(), 1);
        assert_eq!(store.candidates("r1", PeerRole::Client).len(), 1);
    }

    #[test]
    fn test_answer_requires_offer() {
        let store = MemoryRoomStore::new();
        let result = store.set_answer("missing", json!({}));

        assert!(matches!(result, Err(SignalError::RoomNotFound(_))));
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn test_candidates_before_offer_create_room() {
        let store = MemoryRoomStore::new();
        store
            .push_candidate("early", PeerRole::Host, json!({"candidate": "x"}))
            .unwrap();

        assert_eq!(store.room_count(), 1);
        assert_eq!(store.offer("early"), None);
    }

    #[test]
    fn test_remove_room() {
        let store = MemoryRoomStore::new();
        store.set_offer("r1", json!({})).unwrap();

        assert!(store.remove_room("r1"));
        assert!(!store.remove_room("r1"));
        assert!(store.room("r1").is_none());
    }

    #[test]
    fn test_messages_for_client() {
        let room = Room {
            offer: Some(json!({"sdp": "o"})),
            answer: None,
            host_candidates: vec![json!(1), json!(2)],
            client_candidates: vec![json!(3)],
        };

        let msgs = room.messages_for(PeerRole::Client);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].kind, SignalKind::Offer);
        assert_eq!(msgs[1], SignalMessage::ice_candidate(json!(1)));
        assert_eq!(msgs[2], SignalMessage::ice_candidate(json!(2)));

        // Host has no answer yet, only the client's candidate
        let msgs = room.messages_for(PeerRole::Host);
        assert_eq!(msgs, vec![SignalMessage::ice_candidate(json!(3))]);
    }

    #[test]
    fn test_room_json_shape() {
        let room = Room {
            offer: Some(json!({"sdp": "o"})),
            host_candidates: vec![json!({"candidate": "h"})],
            ..Default::default()
        };

        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["hostCandidates"][0]["candidate"], "h");
        assert!(value.get("answer").is_none());
    }

    #[tokio::test]
    async fn test_room_sink_on_relay() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let relay = SignalingRelay::new();

        let (host, _rx) = relay.subscribe_channel(8).await;
        relay
            .subscribe(Arc::new(RoomSink::new(
                Arc::clone(&store),
                "r1",
                PeerRole::Host,
            )))
            .await;

        relay
            .relay(host, SignalMessage::offer(json!({"sdp": "o"})))
            .await;
        relay
            .relay(host, SignalMessage::ice_candidate(json!({"candidate": "h1"})))
            .await;

        // A client joining later replays the same messages from the store
        let room = store.room("r1").unwrap();
        let replay = room.messages_for(PeerRole::Client);
        assert_eq!(
            replay,
            vec![
                SignalMessage::offer(json!({"sdp": "o"})),
                SignalMessage::ice_candidate(json!({"candidate": "h1"})),
            ]
        );
    }

    #[tokio::test]
    async fn test_room_sink_failure_drops_it() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let relay = SignalingRelay::new();

        let (client, _rx) = relay.subscribe_channel(8).await;
        relay
            .subscribe(Arc::new(RoomSink::new(store, "nowhere", PeerRole::Client)))
            .await;

        // No offer in the room, so storing the answer fails
        let report = relay.relay(client, SignalMessage::answer(json!({}))).await;

        assert_eq!(report.removed, 1);
        assert_eq!(relay.peer_count().await, 1);
    }
}
