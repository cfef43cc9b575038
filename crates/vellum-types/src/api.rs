use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeSet;
use crate::models::{IdentityId, MessageId, RoomId};

// -- Identities --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishKeyRequest {
    /// SubjectPublicKeyInfo PEM
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub identity_id: IdentityId,
    pub public_key: String,
    pub fingerprint: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub envelopes: EnvelopeSet,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: IdentityId,
    pub envelopes: EnvelopeSet,
    pub created_at: DateTime<Utc>,
}
