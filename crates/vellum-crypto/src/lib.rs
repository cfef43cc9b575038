//! Vellum Crypto Library
//!
//! Hybrid encryption for chat messages: every message body is sealed once
//! with a fresh AES-256-GCM key, and that key is wrapped with RSA-OAEP for
//! each recipient. Private keys stay with their owner.
//!
//! The `client` feature carries everything that needs a private key (key
//! generation, unwrap, open). Relays build without it and can only seal.

pub mod encrypt;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod store;
pub mod wrap;

pub use error::{CryptoError, Result};
pub use keys::PublicKey;
#[cfg(feature = "client")]
pub use keys::{Identity, PrivateKey};
pub use protocol::{Algorithm, seal};
#[cfg(feature = "client")]
pub use protocol::open;
pub use store::{KeyStore, Keyring, KeyringError, MemoryKeyStore, StoreError, StoredKeyPair};
