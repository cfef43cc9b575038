use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, Payload, rand_core::RngCore},
};
use zeroize::Zeroizing;

use vellum_types::envelope::MAX_BODY_LEN;
pub use vellum_types::envelope::NONCE_SIZE;

use crate::error::{CryptoError, Result};

pub const KEY_SIZE: usize = 32;
pub const TAG_SIZE: usize = 16;

/// Largest plaintext whose sealed body still fits in an envelope.
pub const MAX_PLAINTEXT_LEN: usize = MAX_BODY_LEN - TAG_SIZE;

/// A 256-bit AES-GCM key, zeroized on drop. Lives only for the duration of
/// one seal or open.
pub struct SymmetricKey(Zeroizing<[u8; KEY_SIZE]>);

impl SymmetricKey {
    /// Draw a fresh key from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng
            .try_fill_bytes(key.as_mut())
            .map_err(|_| CryptoError::KeyGeneration)?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Used by unwrap; any length other than KEY_SIZE is rejected.
    pub(crate) fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_SIZE {
            return None;
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(bytes);
        Some(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// A body ciphertext together with the key and nonce that produced it.
#[derive(Debug)]
pub struct SealedBody {
    pub key: SymmetricKey,
    pub nonce: [u8; NONCE_SIZE],
    /// ciphertext || GCM tag
    pub ciphertext: Vec<u8>,
}

/// Encrypt a message body under a freshly generated key.
///
/// `aad` is authenticated but not encrypted; the envelope protocol passes the
/// algorithm id so it cannot be swapped after sealing.
pub fn encrypt_body(plaintext: &[u8], aad: &[u8]) -> Result<SealedBody> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PayloadTooLarge {
            len: plaintext.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }

    let key = SymmetricKey::generate()?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|_| CryptoError::KeyGeneration)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    // Only fails on plaintexts beyond the GCM length limit, already excluded above
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::PayloadTooLarge {
            len: plaintext.len(),
            max: MAX_PLAINTEXT_LEN,
        })?;

    Ok(SealedBody {
        key,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a message body.
///
/// A body too short to hold a tag is a `Decoding` error; any tag mismatch
/// (wrong key, tampered body, nonce or aad) is an `Integrity` error.
pub fn decrypt_body(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decoding("body shorter than tag"));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(nonce);

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Integrity)?;

    Ok(Zeroizing::new(plaintext))
}
