use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, trace, warn};

use vellum_types::{IdentityId, RoomId};
use vellum_types::events::{RelayCommand, RelayEvent};

use crate::relay::{Broadcast, Relay};

/// Ping cadence. Two unanswered pings in a row drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket connection. The identity was authenticated at the
/// HTTP upgrade, so the client gets `Ready` straight away.
pub async fn handle_connection(socket: WebSocket, relay: Relay, identity_id: IdentityId) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to relay", identity_id);

    let Some(ready) = encode(&RelayEvent::Ready { identity_id }) else {
        return;
    };
    if sender.send(ready).await.is_err() {
        return;
    }

    let mut broadcast_rx = relay.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<RelayEvent>();

    // Rooms this connection joined, shared between send and recv tasks
    let joined: Arc<RwLock<HashSet<RoomId>>> = Arc::new(RwLock::new(HashSet::new()));
    let send_joined = joined.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let item = match result {
                        Ok(item) => item,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("{} lagged behind the relay by {} messages", identity_id, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let event = {
                        let joined = send_joined.read().await;
                        deliver(&item, identity_id, &joined)
                    };
                    let Some(msg) = event.as_ref().and_then(encode) else {
                        continue;
                    };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                result = reply_rx.recv() => {
                    let Some(event) = result else {
                        break;
                    };
                    let Some(msg) = encode(&event) else {
                        continue;
                    };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{} missed {} pongs, dropping connection", identity_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let relay_recv = relay.clone();
    let recv_joined = joined.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RelayCommand>(&text) {
                    Ok(cmd) => {
                        if let Some(reply) =
                            handle_command(&relay_recv, identity_id, cmd, &recv_joined).await
                        {
                            let _ = reply_tx.send(reply);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            identity_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = reply_tx.send(RelayEvent::Error {
                            reason: "malformed command".into(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side ends first takes the other down
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    for room_id in joined.read().await.iter() {
        relay.leave(*room_id, identity_id).await;
    }
    info!("{} disconnected from relay", identity_id);
}

/// Apply a client command. Returns an event to send back to this client
/// only, if any.
async fn handle_command(
    relay: &Relay,
    identity_id: IdentityId,
    cmd: RelayCommand,
    joined: &RwLock<HashSet<RoomId>>,
) -> Option<RelayEvent> {
    match cmd {
        // `joined` only records a room once the relay has counted this
        // connection, so disconnect cleanup releases exactly what was taken.
        RelayCommand::Join { room_id } => {
            let mut joined = joined.write().await;
            if !joined.contains(&room_id) {
                relay.join(room_id, identity_id).await;
                joined.insert(room_id);
            }
            None
        }
        RelayCommand::Leave { room_id } => {
            let mut joined = joined.write().await;
            if joined.contains(&room_id) {
                relay.leave(room_id, identity_id).await;
                joined.remove(&room_id);
            }
            None
        }
        RelayCommand::Publish { room_id, envelopes } => {
            trace!("{} publishing to {}", identity_id, room_id);
            match relay.publish(room_id, envelopes, identity_id, Utc::now()).await {
                Ok(_) => None,
                Err(e) => {
                    warn!("{} publish to {} failed: {}", identity_id, room_id, e);
                    Some(RelayEvent::Error {
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Decide what a connection of `identity_id` sees of a broadcast.
///
/// Only rooms the connection joined are delivered, and a message only if
/// it was sealed for this identity, carrying that single envelope.
pub(crate) fn deliver(
    item: &Broadcast,
    identity_id: IdentityId,
    joined: &HashSet<RoomId>,
) -> Option<RelayEvent> {
    match item {
        Broadcast::Message(message) => {
            if !joined.contains(&message.room_id) {
                return None;
            }
            let envelope = message.envelopes.get(&identity_id)?;
            Some(RelayEvent::MessageCreate {
                id: message.id,
                room_id: message.room_id,
                sender_id: message.sender_id,
                envelope: envelope.clone(),
                timestamp: message.timestamp,
            })
        }
        Broadcast::Event(event) => match event.room_id() {
            Some(room_id) if !joined.contains(&room_id) => None,
            _ => Some(event.clone()),
        },
    }
}

fn encode(event: &RelayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode relay event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vellum_types::models::SealedMessage;
    use vellum_types::{Envelope, EnvelopeSet};

    fn envelope(tag: u8) -> Envelope {
        Envelope {
            algorithm_id: 1,
            wrapped_key: vec![tag; 256],
            nonce: [tag; 12],
            body: vec![tag; 24],
        }
    }

    fn message(room_id: Uuid, envelopes: EnvelopeSet) -> Broadcast {
        Broadcast::Message(Arc::new(SealedMessage {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Uuid::new_v4(),
            envelopes,
            timestamp: Utc::now(),
        }))
    }

    #[test]
    fn recipient_receives_only_its_own_envelope() {
        let (room, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let joined = HashSet::from([room]);
        let item = message(room, EnvelopeSet::from([(alice, envelope(1)), (bob, envelope(2))]));

        match deliver(&item, bob, &joined) {
            Some(RelayEvent::MessageCreate { envelope: got, .. }) => assert_eq!(got, envelope(2)),
            other => panic!("unexpected delivery: {:?}", other),
        }
    }

    #[test]
    fn non_recipients_and_other_rooms_get_nothing() {
        let (room, alice, eve) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let item = message(room, EnvelopeSet::from([(alice, envelope(1))]));

        assert!(deliver(&item, eve, &HashSet::from([room])).is_none());
        assert!(deliver(&item, alice, &HashSet::new()).is_none());
    }

    #[test]
    fn membership_events_are_room_scoped() {
        let (room, other) = (Uuid::new_v4(), Uuid::new_v4());
        let event = Broadcast::Event(RelayEvent::MemberJoined {
            room_id: room,
            identity_id: Uuid::new_v4(),
        });
        let me = Uuid::new_v4();

        assert!(deliver(&event, me, &HashSet::from([room])).is_some());
        assert!(deliver(&event, me, &HashSet::from([other])).is_none());
    }

    fn relay() -> Relay {
        Relay::new(Arc::new(vellum_db::Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn join_and_leave_track_relay_membership() {
        let relay = relay();
        let (room, alice) = (Uuid::new_v4(), Uuid::new_v4());
        let first = RwLock::new(HashSet::new());
        let second = RwLock::new(HashSet::new());

        // Two connections of the same identity, one of them joining twice
        for joined in [&first, &first, &second] {
            handle_command(&relay, alice, RelayCommand::Join { room_id: room }, joined).await;
        }
        assert_eq!(relay.members(room).await, vec![alice]);

        handle_command(&relay, alice, RelayCommand::Leave { room_id: room }, &first).await;
        assert!(first.read().await.is_empty());
        assert_eq!(relay.members(room).await, vec![alice]);

        // Leaving again, or from a room never joined, releases nothing
        handle_command(&relay, alice, RelayCommand::Leave { room_id: room }, &first).await;
        handle_command(&relay, alice, RelayCommand::Leave { room_id: Uuid::new_v4() }, &first).await;
        assert_eq!(relay.members(room).await, vec![alice]);

        handle_command(&relay, alice, RelayCommand::Leave { room_id: room }, &second).await;
        assert!(relay.members(room).await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_cleanup_releases_only_joined_rooms() {
        let relay = relay();
        let mut rx = relay.subscribe();
        let (room, alice) = (Uuid::new_v4(), Uuid::new_v4());
        let joined = RwLock::new(HashSet::new());

        handle_command(&relay, alice, RelayCommand::Join { room_id: room }, &joined).await;
        handle_command(&relay, alice, RelayCommand::Join { room_id: room }, &joined).await;
        for room_id in joined.read().await.iter() {
            relay.leave(*room_id, alice).await;
        }
        assert!(relay.members(room).await.is_empty());

        let mut left = 0;
        while let Ok(item) = rx.try_recv() {
            if let Broadcast::Event(RelayEvent::MemberLeft { .. }) = item {
                left += 1;
            }
        }
        assert_eq!(left, 1);
    }
}
