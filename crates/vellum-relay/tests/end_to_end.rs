//! Clients seal and open; the relay in between only stores and forwards
//! envelopes.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vellum_crypto::{CryptoError, keys, open, seal};
use vellum_db::Database;
use vellum_relay::{Broadcast, Relay};

#[tokio::test]
async fn sealed_message_crosses_the_relay() {
    let relay = Relay::new(Arc::new(Database::open_in_memory().unwrap()));
    let mut live = relay.subscribe();

    let alice = keys::generate(Uuid::new_v4()).unwrap();
    let bob = keys::generate(Uuid::new_v4()).unwrap();
    let eve = keys::generate(Uuid::new_v4()).unwrap();
    let room = Uuid::new_v4();

    let sealed = seal(
        b"the eagle has landed",
        [(alice.id(), alice.public_key()), (bob.id(), bob.public_key())],
    )
    .unwrap();
    let published = relay.publish(room, sealed, alice.id(), Utc::now()).await.unwrap();

    let Broadcast::Message(delivered) = live.recv().await.unwrap() else {
        panic!("expected a message broadcast");
    };
    assert_eq!(delivered.id, published.id);

    // Bob reads from history after the fact
    let history = relay.history(room, bob.id(), 50, None).await.unwrap();
    let envelope = &history[0].envelopes[&bob.id()];
    assert_eq!(
        open(envelope, bob.private_key()).unwrap().as_slice(),
        b"the eagle has landed"
    );

    // Eve was not a recipient: no history, and Bob's envelope is useless to her
    assert!(relay.history(room, eve.id(), 50, None).await.unwrap().is_empty());
    assert_eq!(open(envelope, eve.private_key()).unwrap_err(), CryptoError::Unwrap);
}

#[tokio::test]
async fn tampering_in_storage_is_detected() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let relay = Relay::new(db.clone());
    let alice = keys::generate(Uuid::new_v4()).unwrap();
    let room = Uuid::new_v4();

    let mut sealed = seal(b"pay 10", [(alice.id(), alice.public_key())]).unwrap();
    if let Some(envelope) = sealed.get_mut(&alice.id()) {
        envelope.body[0] ^= 0x01;
    }
    let message = relay.publish(room, sealed, alice.id(), Utc::now()).await.unwrap();

    let stored = db.get_envelope(message.id, alice.id()).unwrap().unwrap();
    assert_eq!(open(&stored, alice.private_key()).unwrap_err(), CryptoError::Integrity);
}
