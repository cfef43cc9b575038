use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::EnvelopeSet;

pub type IdentityId = Uuid;
pub type RoomId = Uuid;
pub type MessageId = Uuid;

/// Messages stored on the server are always sealed.
/// The server only sees envelopes, never plaintext or unwrapped keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: IdentityId,
    pub envelopes: EnvelopeSet,
    pub timestamp: DateTime<Utc>,
}

/// A position in a room's history. A page holds messages strictly older
/// than the cursor. `id` orders messages that share a timestamp; without it
/// every message at `timestamp` is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub timestamp: DateTime<Utc>,
    pub id: Option<MessageId>,
}

impl HistoryCursor {
    /// The cursor just past `message`, for fetching the next older page.
    pub fn before(message: &SealedMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            id: Some(message.id),
        }
    }
}
