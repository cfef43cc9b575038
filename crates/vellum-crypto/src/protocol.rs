//! Seal and open: the per-recipient envelope protocol.
//!
//! `seal` encrypts the body exactly once and wraps that one key for every
//! recipient, so all envelopes of a message carry a byte-identical body and
//! differ only in `wrapped_key`. `open` reverses it for a single recipient
//! and reports which stage failed.

use tracing::debug;

use vellum_types::{Envelope, EnvelopeSet, IdentityId};

use crate::encrypt::encrypt_body;
use crate::error::{CryptoError, Result};
use crate::keys::PublicKey;
use crate::wrap::wrap;

/// Envelope algorithm identifiers. New schemes get new ids; old ids are
/// never reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// RSA-2048 OAEP-SHA256 key wrap, AES-256-GCM body
    RsaOaepSha256Aes256Gcm = 1,
}

impl Algorithm {
    pub const CURRENT: Algorithm = Algorithm::RsaOaepSha256Aes256Gcm;

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Associated data bound into the body ciphertext.
    fn aad(self) -> [u8; 1] {
        [self.id()]
    }
}

impl TryFrom<u8> for Algorithm {
    type Error = CryptoError;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Self::RsaOaepSha256Aes256Gcm),
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }
}

/// Seal `plaintext` for each recipient.
///
/// The body is encrypted once before any wrapping starts. A recipient id
/// listed more than once gets a single envelope wrapped under the first key
/// given for it. No recipients means nothing is encrypted.
pub fn seal<'a, I>(plaintext: &[u8], recipients: I) -> Result<EnvelopeSet>
where
    I: IntoIterator<Item = (IdentityId, &'a PublicKey)>,
{
    let mut recipients = recipients.into_iter().peekable();
    let mut envelopes = EnvelopeSet::new();
    if recipients.peek().is_none() {
        return Ok(envelopes);
    }

    let algorithm = Algorithm::CURRENT;
    let body = encrypt_body(plaintext, &algorithm.aad())?;

    for (recipient_id, public_key) in recipients {
        if envelopes.contains_key(&recipient_id) {
            continue;
        }
        let wrapped_key = wrap(public_key, &body.key)?;
        envelopes.insert(
            recipient_id,
            Envelope {
                algorithm_id: algorithm.id(),
                wrapped_key,
                nonce: body.nonce,
                body: body.ciphertext.clone(),
            },
        );
    }

    debug!(
        "sealed {} byte message for {} recipients",
        plaintext.len(),
        envelopes.len()
    );
    Ok(envelopes)
}

#[cfg(feature = "client")]
pub use client::{open, open_bytes};

#[cfg(feature = "client")]
mod client {
    use zeroize::Zeroizing;

    use vellum_types::Envelope;

    use super::Algorithm;
    use crate::encrypt::{TAG_SIZE, decrypt_body};
    use crate::error::{CryptoError, Result};
    use crate::keys::PrivateKey;
    use crate::wrap::unwrap;

    /// Open an envelope addressed to the holder of `private_key`.
    ///
    /// Checks run cheapest first: algorithm id, then structure, then unwrap,
    /// then body authentication. The error kind tells the caller which stage
    /// rejected the envelope.
    pub fn open(envelope: &Envelope, private_key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let algorithm = Algorithm::try_from(envelope.algorithm_id)?;

        if envelope.wrapped_key.is_empty() {
            return Err(CryptoError::Decoding("empty wrapped key"));
        }
        if envelope.body.len() < TAG_SIZE {
            return Err(CryptoError::Decoding("body shorter than tag"));
        }

        let key = unwrap(private_key, &envelope.wrapped_key)?;
        decrypt_body(&key, &envelope.nonce, &envelope.body, &algorithm.aad())
    }

    /// Decode a binary envelope and open it. Malformed bytes are rejected
    /// before any cryptographic work.
    pub fn open_bytes(data: &[u8], private_key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let envelope = Envelope::from_bytes(data)?;
        open(&envelope, private_key)
    }
}
