//! Signaling message format
//!
//! On the wire a message is a JSON object:
//!
//! ```json
//! { "type": "offer", "payload": { "type": "offer", "sdp": "v=0..." } }
//! { "type": "ice-candidate", "payload": { "candidate": "...", "sdpMid": "0" } }
//! ```
//!
//! The payload is carried as-is and never interpreted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for signaling operations
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Message was not valid JSON or had an unknown type
    #[error("malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Room does not exist in the store
    #[error("room not found: {0}")]
    RoomNotFound(String),
}

/// Kind of negotiation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// Session description from the initiating peer
    Offer,
    /// Session description from the responding peer
    Answer,
    /// Connectivity candidate from either peer
    IceCandidate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        };
        f.write_str(name)
    }
}

/// A negotiation message relayed between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Opaque payload (session description or candidate)
    pub payload: Value,
}

impl SignalMessage {
    /// Create a message
    pub fn new(kind: SignalKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Create an offer
    pub fn offer(payload: Value) -> Self {
        Self::new(SignalKind::Offer, payload)
    }

    /// Create an answer
    pub fn answer(payload: Value) -> Self {
        Self::new(SignalKind::Answer, payload)
    }

    /// Create an ICE candidate
    pub fn ice_candidate(payload: Value) -> Self {
        Self::new(SignalKind::IceCandidate, payload)
    }

    /// Parse a message from JSON text
    pub fn from_json(text: &str) -> Result<Self, SignalError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the message to JSON text
    pub fn to_json(&self) -> Result<String, SignalError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_ice_candidate() {
        let text = r#"{"type":"ice-candidate","payload":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0"}}"#;
        let msg = SignalMessage::from_json(text).unwrap();

        assert_eq!(msg.kind, SignalKind::IceCandidate);
        assert_eq!(msg.payload["sdpMid"], "0");
    }

    #[test]
    fn test_payload_is_preserved() {
        let payload = json!({"type": "offer", "sdp": "v=0\r\n", "extra": [1, 2, {"x": null}]});
        let msg = SignalMessage::offer(payload.clone());

        let parsed = SignalMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn test_wire_type_names() {
        let msg = SignalMessage::ice_candidate(json!({}));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(SignalKind::Answer.to_string(), "answer");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = SignalMessage::from_json(r#"{"type":"bye","payload":{}}"#);
        assert!(matches!(result, Err(SignalError::Malformed(_))));
    }

    #[test]
    fn test_missing_payload_is_rejected() {
        assert!(SignalMessage::from_json(r#"{"type":"offer"}"#).is_err());
        assert!(SignalMessage::from_json("not json").is_err());
    }
}
