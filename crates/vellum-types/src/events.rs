use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, EnvelopeSet};
use crate::models::{IdentityId, MessageId, RoomId};

/// Events sent over the WebSocket relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayEvent {
    /// Server confirms the connection's identity
    Ready { identity_id: IdentityId },

    /// A sealed message was posted; carries only the receiving
    /// connection's own envelope.
    MessageCreate {
        id: MessageId,
        room_id: RoomId,
        sender_id: IdentityId,
        envelope: Envelope,
        timestamp: DateTime<Utc>,
    },

    /// An identity joined a room
    MemberJoined {
        room_id: RoomId,
        identity_id: IdentityId,
    },

    /// An identity left a room
    MemberLeft {
        room_id: RoomId,
        identity_id: IdentityId,
    },

    /// A command was rejected
    Error { reason: String },
}

impl RelayEvent {
    /// Returns the room_id if this event is scoped to a specific room.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Self::MessageCreate { room_id, .. }
            | Self::MemberJoined { room_id, .. }
            | Self::MemberLeft { room_id, .. } => Some(*room_id),
            Self::Ready { .. } | Self::Error { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RelayCommand {
    /// Start receiving live messages for a room
    Join { room_id: RoomId },

    /// Stop receiving live messages for a room
    Leave { room_id: RoomId },

    /// Publish a message sealed for each recipient
    Publish {
        room_id: RoomId,
        envelopes: EnvelopeSet,
    },
}
