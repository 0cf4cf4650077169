//! Chat messages and the envelope exchanged between peers and the hub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::connection::ConnectionInfo;
use crate::error::{RelayError, Result};

/// A chat message after it has been durably stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub user_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(room_id: String, user_id: String, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            message,
            created_at: Utc::now(),
        }
    }
}

/// Payload of a `message` envelope
///
/// Peers usually send plain text; messages coming from the REST layer carry
/// the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Text(String),
    Stored(ChatMessage),
}

/// Payload of `user_joined` / `user_left` envelopes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(default)]
    pub user_id: String,
    /// Members in the room right after the change
    #[serde(default)]
    pub online: usize,
}

/// Envelope kind with one payload shape per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EnvelopeKind {
    Message(ChatPayload),
    UserJoined(Presence),
    UserLeft(Presence),
}

impl EnvelopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
        }
    }
}

/// The unit of data fanned out to every member of a room.
///
/// On the wire this is a single JSON text frame:
/// `{"room_id": .., "user_id": .., "type": .., "payload": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(flatten)]
    pub kind: EnvelopeKind,
}

impl Envelope {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>, kind: EnvelopeKind) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            kind,
        }
    }

    pub fn message(room_id: impl Into<String>, user_id: impl Into<String>, payload: ChatPayload) -> Self {
        Self::new(room_id, user_id, EnvelopeKind::Message(payload))
    }

    pub fn user_joined(room_id: impl Into<String>, user_id: impl Into<String>, online: usize) -> Self {
        let user_id = user_id.into();
        let presence = Presence {
            user_id: user_id.clone(),
            online,
        };
        Self::new(room_id, user_id, EnvelopeKind::UserJoined(presence))
    }

    pub fn user_left(room_id: impl Into<String>, user_id: impl Into<String>, online: usize) -> Self {
        let user_id = user_id.into();
        let presence = Presence {
            user_id: user_id.clone(),
            online,
        };
        Self::new(room_id, user_id, EnvelopeKind::UserLeft(presence))
    }

    /// Decode an envelope received from a peer. Identity fields are optional
    /// here because they are never trusted.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Replace the declared identity with the authenticated connection's
    pub fn stamped(mut self, info: &ConnectionInfo) -> Self {
        self.room_id = info.room_id.clone();
        self.user_id = info.user_id.clone();
        self
    }

    /// Decode a frame sent by a connected peer and bind it to that peer.
    ///
    /// Identity is taken from `info` everywhere, including inside presence
    /// payloads. Stored records only come from the persistence layer, so a
    /// peer sending one is a protocol error.
    pub fn from_peer(bytes: &[u8], info: &ConnectionInfo) -> Result<Self> {
        let mut envelope = Self::decode(bytes)?.stamped(info);
        match &mut envelope.kind {
            EnvelopeKind::Message(ChatPayload::Text(_)) => {}
            EnvelopeKind::Message(ChatPayload::Stored(_)) => {
                return Err(RelayError::ValidationError(
                    "stored messages cannot be sent by peers".to_string(),
                ));
            }
            EnvelopeKind::UserJoined(presence) | EnvelopeKind::UserLeft(presence) => {
                presence.user_id = info.user_id.clone();
            }
        }
        Ok(envelope)
    }
}
