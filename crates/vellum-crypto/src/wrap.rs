//! RSA-OAEP (SHA-256, MGF1-SHA-256, empty label) key wrapping.
//!
//! Only for short fixed-size secrets. Message bodies go through `encrypt`.

use aes_gcm::aead::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use tracing::trace;

use crate::encrypt::SymmetricKey;
use crate::error::{CryptoError, Result};
use crate::keys::PublicKey;

const HASH_LEN: usize = 32;

/// Largest payload OAEP-SHA256 can carry under this key: k - 2*hLen - 2.
pub fn max_payload(public_key: &PublicKey) -> usize {
    public_key.size().saturating_sub(2 * HASH_LEN + 2)
}

/// Wrap a symmetric key for the holder of `public_key`.
pub fn wrap(public_key: &PublicKey, key: &SymmetricKey) -> Result<Vec<u8>> {
    wrap_bytes(public_key, key.as_bytes())
}

/// Wrap raw secret bytes. Fails with `PayloadTooLarge` before any
/// encryption happens if the payload does not fit.
pub fn wrap_bytes(public_key: &PublicKey, secret: &[u8]) -> Result<Vec<u8>> {
    let max = max_payload(public_key);
    if secret.len() > max {
        return Err(CryptoError::PayloadTooLarge {
            len: secret.len(),
            max,
        });
    }

    // Length is already checked, so the only remaining failure is the RNG
    let wrapped = public_key
        .as_rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), secret)
        .map_err(|_| CryptoError::KeyGeneration)?;
    trace!("wrapped {} bytes into {}", secret.len(), wrapped.len());
    Ok(wrapped)
}

#[cfg(feature = "client")]
pub use client::{unwrap, unwrap_bytes};

#[cfg(feature = "client")]
mod client {
    use aes_gcm::aead::OsRng;
    use rsa::Oaep;
    use sha2::Sha256;
    use zeroize::Zeroizing;

    use crate::encrypt::SymmetricKey;
    use crate::error::{CryptoError, Result};
    use crate::keys::PrivateKey;

    /// Unwrap a symmetric key. Wrong key, bad padding, wrong length and a
    /// wrapped secret of the wrong size all produce the same `Unwrap` error.
    pub fn unwrap(private_key: &PrivateKey, wrapped: &[u8]) -> Result<SymmetricKey> {
        let secret = unwrap_bytes(private_key, wrapped)?;
        SymmetricKey::from_slice(&secret).ok_or(CryptoError::Unwrap)
    }

    /// Unwrap raw secret bytes. Decryption is blinded.
    pub fn unwrap_bytes(private_key: &PrivateKey, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        private_key
            .as_rsa()
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Unwrap)
    }
}

#[cfg(all(test, feature = "client"))]
mod tests {
    use super::*;
    use crate::encrypt::KEY_SIZE;
    use crate::keys::generate;
    use uuid::Uuid;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let identity = generate(Uuid::new_v4()).unwrap();
        let key = SymmetricKey::generate().unwrap();

        let wrapped = wrap(identity.public_key(), &key).unwrap();
        assert_eq!(wrapped.len(), identity.public_key().size());

        let unwrapped = unwrap(identity.private_key(), &wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn wrapping_is_randomised() {
        let identity = generate(Uuid::new_v4()).unwrap();
        let key = SymmetricKey::from_bytes([9u8; KEY_SIZE]);
        let a = wrap(identity.public_key(), &key).unwrap();
        let b = wrap(identity.public_key(), &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn max_payload_for_2048_bit_key() {
        let identity = generate(Uuid::new_v4()).unwrap();
        let max = max_payload(identity.public_key());
        assert_eq!(max, 190);

        let exact = vec![0x5A; max];
        let wrapped = wrap_bytes(identity.public_key(), &exact).unwrap();
        assert_eq!(*unwrap_bytes(identity.private_key(), &wrapped).unwrap(), exact);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let identity = generate(Uuid::new_v4()).unwrap();
        let too_big = vec![0u8; 191];
        assert_eq!(
            wrap_bytes(identity.public_key(), &too_big).unwrap_err(),
            CryptoError::PayloadTooLarge { len: 191, max: 190 }
        );
    }

    #[test]
    fn wrong_key_and_corruption_look_the_same() {
        let alice = generate(Uuid::new_v4()).unwrap();
        let mallory = generate(Uuid::new_v4()).unwrap();
        let key = SymmetricKey::generate().unwrap();

        let wrapped = wrap(alice.public_key(), &key).unwrap();
        let wrong_key = unwrap(mallory.private_key(), &wrapped).unwrap_err();

        let mut corrupted = wrapped.clone();
        corrupted[10] ^= 0x80;
        let bad_padding = unwrap(alice.private_key(), &corrupted).unwrap_err();

        let truncated = unwrap(alice.private_key(), &wrapped[..100]).unwrap_err();

        assert_eq!(wrong_key, CryptoError::Unwrap);
        assert_eq!(bad_padding, CryptoError::Unwrap);
        assert_eq!(truncated, CryptoError::Unwrap);
        assert_eq!(wrong_key.to_string(), bad_padding.to_string());
    }

    #[test]
    fn non_key_sized_secret_fails_unwrap() {
        let identity = generate(Uuid::new_v4()).unwrap();
        let wrapped = wrap_bytes(identity.public_key(), &[1u8; 16]).unwrap();
        assert_eq!(
            unwrap(identity.private_key(), &wrapped).unwrap_err(),
            CryptoError::Unwrap
        );
    }
}
