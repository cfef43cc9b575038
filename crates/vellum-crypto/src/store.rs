//! Key storage boundary and the keyring that drives seal/open through it.
//!
//! Stores hold PEM text they never interpret. A store may keep only the
//! public half of an identity: that is the normal case on a relay, where
//! private keys live with their owners.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use zeroize::Zeroizing;

use vellum_types::{EnvelopeSet, IdentityId};

use crate::error::CryptoError;
use crate::keys::PublicKey;
use crate::protocol::seal;

/// PEM blobs for one identity.
#[derive(Clone)]
pub struct StoredKeyPair {
    pub public_pem: String,
    pub private_pem: Option<Zeroizing<String>>,
}

impl StoredKeyPair {
    pub fn public_only(public_pem: String) -> Self {
        Self {
            public_pem,
            private_pem: None,
        }
    }
}

impl std::fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_pem", &self.public_pem)
            .field("private_pem", &self.private_pem.as_ref().map(|_| ".."))
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity {0} already has keys")]
    AlreadyExists(IdentityId),
    #[error("key store backend failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Durable storage for identity keys. Identities are immutable: `put` on an
/// existing id fails with `AlreadyExists`.
pub trait KeyStore: Send + Sync {
    fn put(&self, id: IdentityId, keys: StoredKeyPair) -> Result<(), StoreError>;

    fn get(&self, id: IdentityId) -> Result<Option<StoredKeyPair>, StoreError>;

    fn public_key(&self, id: IdentityId) -> Result<Option<String>, StoreError> {
        Ok(self.get(id)?.map(|keys| keys.public_pem))
    }
}

impl<S: KeyStore + ?Sized> KeyStore for std::sync::Arc<S> {
    fn put(&self, id: IdentityId, keys: StoredKeyPair) -> Result<(), StoreError> {
        (**self).put(id, keys)
    }

    fn get(&self, id: IdentityId) -> Result<Option<StoredKeyPair>, StoreError> {
        (**self).get(id)
    }

    fn public_key(&self, id: IdentityId) -> Result<Option<String>, StoreError> {
        (**self).public_key(id)
    }
}

/// In-process key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<IdentityId, StoredKeyPair>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn put(&self, id: IdentityId, keys: StoredKeyPair) -> Result<(), StoreError> {
        let mut map = self
            .keys
            .write()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("key store lock poisoned: {}", e)))?;
        if map.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        map.insert(id, keys);
        Ok(())
    }

    fn get(&self, id: IdentityId) -> Result<Option<StoredKeyPair>, StoreError> {
        let map = self
            .keys
            .read()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("key store lock poisoned: {}", e)))?;
        Ok(map.get(&id).cloned())
    }
}

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no keys stored for identity {0}")]
    UnknownIdentity(IdentityId),
    #[error("private key for identity {0} is not held here")]
    MissingPrivateKey(IdentityId),
}

/// Seal and open against a key store.
pub struct Keyring<S> {
    store: S,
}

impl<S: KeyStore> Keyring<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Look up and parse a recipient's public key.
    pub fn public_key(&self, id: IdentityId) -> Result<PublicKey, KeyringError> {
        let pem = self
            .store
            .public_key(id)?
            .ok_or(KeyringError::UnknownIdentity(id))?;
        Ok(PublicKey::from_pem(&pem)?)
    }

    /// Seal for the given recipients, resolving each public key from the
    /// store first. Nothing is encrypted if any recipient is unknown.
    pub fn seal(&self, plaintext: &[u8], recipients: &[IdentityId]) -> Result<EnvelopeSet, KeyringError> {
        let keys = recipients
            .iter()
            .map(|&id| self.public_key(id).map(|key| (id, key)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(seal(plaintext, keys.iter().map(|(id, key)| (*id, key)))?)
    }
}

#[cfg(feature = "client")]
impl<S: KeyStore> Keyring<S> {
    /// Generate a key pair for a new identity and store both halves.
    pub fn register(&self, id: IdentityId) -> Result<crate::keys::Identity, KeyringError> {
        let identity = crate::keys::generate(id)?;
        self.store.put(
            id,
            StoredKeyPair {
                public_pem: identity.public_pem()?,
                private_pem: Some(identity.private_pem()?),
            },
        )?;
        tracing::info!("registered identity {}", id);
        Ok(identity)
    }

    /// Load an identity's full key pair.
    pub fn identity(&self, id: IdentityId) -> Result<crate::keys::Identity, KeyringError> {
        let keys = self.store.get(id)?.ok_or(KeyringError::UnknownIdentity(id))?;
        let private_pem = keys
            .private_pem
            .as_ref()
            .ok_or(KeyringError::MissingPrivateKey(id))?;
        Ok(crate::keys::Identity::from_pem(id, &keys.public_pem, private_pem)?)
    }

    /// Open an envelope addressed to `id` with its stored private key.
    pub fn open(
        &self,
        id: IdentityId,
        envelope: &vellum_types::Envelope,
    ) -> Result<Zeroizing<Vec<u8>>, KeyringError> {
        let identity = self.identity(id)?;
        let plaintext = crate::protocol::open(envelope, identity.private_key())
            .inspect_err(|e| tracing::debug!("open failed for {}: {}", id, e))?;
        Ok(plaintext)
    }
}
