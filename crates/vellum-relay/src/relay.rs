use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use vellum_db::Database;
use vellum_types::events::RelayEvent;
use vellum_types::models::{HistoryCursor, SealedMessage};
use vellum_types::{EnvelopeError, EnvelopeSet, IdentityId, RoomId};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("message has no recipients")]
    NoRecipients,
    #[error("envelope for {recipient} rejected: {source}")]
    InvalidEnvelope {
        recipient: IdentityId,
        source: EnvelopeError,
    },
    #[error("storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

/// What the relay fans out to every connection. Each connection decides
/// what, if anything, its own client gets to see.
#[derive(Debug, Clone)]
pub enum Broadcast {
    Message(Arc<SealedMessage>),
    Event(RelayEvent),
}

/// Manages room membership, persistence and fan-out.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    db: Arc<Database>,

    /// Every connection receives every broadcast and filters locally
    broadcast_tx: broadcast::Sender<Broadcast>,

    /// room_id -> (identity_id -> number of connections joined)
    members: RwLock<HashMap<RoomId, HashMap<IdentityId, usize>>>,
}

impl Relay {
    pub fn new(db: Arc<Database>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RelayInner {
                db,
                broadcast_tx,
                members: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.inner.broadcast_tx.subscribe()
    }

    fn broadcast(&self, item: Broadcast) {
        // No receivers just means nobody is connected
        let _ = self.inner.broadcast_tx.send(item);
    }

    /// Persist a sealed message, then deliver it to live connections.
    ///
    /// Envelopes are checked against the wire limits before anything is
    /// stored, so a message is either stored whole or not at all.
    pub async fn publish(
        &self,
        room_id: RoomId,
        envelopes: EnvelopeSet,
        sender_id: IdentityId,
        timestamp: DateTime<Utc>,
    ) -> Result<Arc<SealedMessage>, RelayError> {
        if envelopes.is_empty() {
            return Err(RelayError::NoRecipients);
        }
        for (recipient, envelope) in &envelopes {
            envelope.to_bytes().map_err(|source| RelayError::InvalidEnvelope {
                recipient: *recipient,
                source,
            })?;
        }

        let message = Arc::new(SealedMessage {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            envelopes,
            timestamp,
        });

        let db = self.inner.db.clone();
        let stored = message.clone();
        tokio::task::spawn_blocking(move || {
            db.insert_message(
                stored.id,
                stored.room_id,
                stored.sender_id,
                stored.timestamp,
                &stored.envelopes,
            )
        })
        .await
        .map_err(|e| anyhow::anyhow!("persist task failed: {}", e))??;

        debug!(
            "message {} in room {} from {} for {} recipients",
            message.id,
            room_id,
            sender_id,
            message.envelopes.len()
        );
        self.broadcast(Broadcast::Message(message.clone()));
        Ok(message)
    }

    /// Stored messages for one recipient, newest first.
    pub async fn history(
        &self,
        room_id: RoomId,
        recipient_id: IdentityId,
        limit: u32,
        before: Option<HistoryCursor>,
    ) -> Result<Vec<SealedMessage>, RelayError> {
        let db = self.inner.db.clone();
        let messages = tokio::task::spawn_blocking(move || {
            db.get_messages_for(room_id, recipient_id, limit, before)
        })
        .await
        .map_err(|e| anyhow::anyhow!("history task failed: {}", e))??;
        Ok(messages)
    }

    /// Add a connection of `identity_id` to a room. Announces the identity
    /// when its first connection joins.
    pub async fn join(&self, room_id: RoomId, identity_id: IdentityId) {
        let first = {
            let mut members = self.inner.members.write().await;
            let count = members.entry(room_id).or_default().entry(identity_id).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            info!("{} joined room {}", identity_id, room_id);
            self.broadcast(Broadcast::Event(RelayEvent::MemberJoined {
                room_id,
                identity_id,
            }));
        }
    }

    /// Remove one connection of `identity_id` from a room. Announces the
    /// departure when its last connection leaves.
    pub async fn leave(&self, room_id: RoomId, identity_id: IdentityId) {
        let last = {
            let mut members = self.inner.members.write().await;
            let Some(room) = members.get_mut(&room_id) else {
                return;
            };
            let Some(count) = room.get_mut(&identity_id) else {
                return;
            };
            *count -= 1;
            let last = *count == 0;
            if last {
                room.remove(&identity_id);
                if room.is_empty() {
                    members.remove(&room_id);
                }
            }
            last
        };

        if last {
            info!("{} left room {}", identity_id, room_id);
            self.broadcast(Broadcast::Event(RelayEvent::MemberLeft {
                room_id,
                identity_id,
            }));
        }
    }

    /// Identities with at least one live connection in the room.
    pub async fn members(&self, room_id: RoomId) -> Vec<IdentityId> {
        self.inner
            .members
            .read()
            .await
            .get(&room_id)
            .map(|room| room.keys().copied().collect())
            .unwrap_or_default()
    }
}
