//! Application message envelopes.
//!
//! Clients and the server exchange text frames of the form
//! `{"type": "...", "payload": {...}}`. Binary frames carry snapshots (see
//! [`crate::wire`]) and never pass through this module.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Message type tags.
pub mod kind {
    pub const ADD_CIRCLE: &str = "add_circle";
    pub const SET_USERNAME: &str = "set_username";
    /// Spelling accepted from older clients.
    pub const SET_USERNAME_LEGACY: &str = "set_userName";
    pub const USERNAME_ACCEPTED: &str = "username_accepted";
    pub const ERROR: &str = "error";
}

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one accepted transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub fn new_unique() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Raw `{type, payload}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<P: Serialize>(kind: &str, payload: &P) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn payload_as<P: DeserializeOwned>(&self, kind: &'static str) -> Result<P, MessageError> {
        P::deserialize(&self.payload).map_err(|source| MessageError::Payload { kind, source })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AddCirclePayload {
    pub x: f32,
    pub y: f32,
}

impl AddCirclePayload {
    /// Point in arena units. Out-of-range values saturate, NaN maps to 0.
    pub fn position(&self) -> (u16, u16) {
        (self.x as u16, self.y as u16)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsernamePayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

/// Client -> room messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    AddCircle(AddCirclePayload),
    SetUsername(UsernamePayload),
}

impl ClientMessage {
    /// Parses one text frame.
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let env: Envelope = serde_json::from_slice(raw).map_err(MessageError::Envelope)?;
        match env.kind.as_str() {
            kind::ADD_CIRCLE => Ok(Self::AddCircle(env.payload_as(kind::ADD_CIRCLE)?)),
            kind::SET_USERNAME | kind::SET_USERNAME_LEGACY => {
                Ok(Self::SetUsername(env.payload_as(kind::SET_USERNAME)?))
            }
            _ => Err(MessageError::UnknownType(env.kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddCircle(_) => kind::ADD_CIRCLE,
            Self::SetUsername(_) => kind::SET_USERNAME,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let env = match self {
            Self::AddCircle(p) => Envelope::new(self.kind(), p)?,
            Self::SetUsername(p) => Envelope::new(self.kind(), p)?,
        };
        env.to_json()
    }
}

/// Room -> client text messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    UsernameAccepted(UsernamePayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UsernameAccepted(_) => kind::USERNAME_ACCEPTED,
            Self::Error(_) => kind::ERROR,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let env = match self {
            Self::UsernameAccepted(p) => Envelope::new(self.kind(), p)?,
            Self::Error(p) => Envelope::new(self.kind(), p)?,
        };
        env.to_json()
    }

    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let env: Envelope = serde_json::from_slice(raw).map_err(MessageError::Envelope)?;
        match env.kind.as_str() {
            kind::USERNAME_ACCEPTED => {
                Ok(Self::UsernameAccepted(env.payload_as(kind::USERNAME_ACCEPTED)?))
            }
            kind::ERROR => Ok(Self::Error(env.payload_as(kind::ERROR)?)),
            _ => Err(MessageError::UnknownType(env.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_circle() {
        let msg = ClientMessage::parse(br#"{"type":"add_circle","payload":{"x":100,"y":120.5}}"#)
            .unwrap();
        let ClientMessage::AddCircle(p) = msg else {
            panic!("expected add_circle, got {msg:?}");
        };
        assert_eq!(p.position(), (100, 120));
    }

    #[test]
    fn accepts_both_username_spellings() {
        for tag in ["set_username", "set_userName"] {
            let raw = format!(r#"{{"type":"{tag}","payload":{{"name":"ada"}}}}"#);
            assert_eq!(
                ClientMessage::parse(raw.as_bytes()).unwrap(),
                ClientMessage::SetUsername(UsernamePayload {
                    name: "ada".into()
                })
            );
        }
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(
            ClientMessage::parse(br#"{"type":"dance","payload":{}}"#),
            Err(MessageError::UnknownType(t)) if t == "dance"
        ));
        assert!(matches!(
            ClientMessage::parse(b"not json"),
            Err(MessageError::Envelope(_))
        ));
        assert!(matches!(
            ClientMessage::parse(br#"{"type":"add_circle","payload":{"x":"left"}}"#),
            Err(MessageError::Payload { kind: "add_circle", .. })
        ));
        assert!(matches!(
            ClientMessage::parse(br#"{"type":"add_circle"}"#),
            Err(MessageError::Payload { .. })
        ));
    }

    #[test]
    fn position_saturates() {
        let p = AddCirclePayload { x: -5.0, y: 1e9 };
        assert_eq!(p.position(), (0, u16::MAX));
        let p = AddCirclePayload { x: f32::NAN, y: 3.7 };
        assert_eq!(p.position(), (0, 3));
    }

    #[test]
    fn server_event_json_shape() {
        let ev = ServerEvent::UsernameAccepted(UsernamePayload { name: "bo".into() });
        let json: serde_json::Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "username_accepted");
        assert_eq!(json["payload"]["name"], "bo");
        assert_eq!(ServerEvent::parse(ev.to_json().unwrap().as_bytes()).unwrap(), ev);

        let err = ServerEvent::error("room is full");
        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(json["payload"]["message"], "room is full");
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new_unique();
        let b = ConnectionId::new_unique();
        assert_ne!(a, b);
    }
}
