//! Identity key pairs: RSA-2048, PEM encoded.
//!
//! Public keys travel as SubjectPublicKeyInfo PEM, private keys as
//! unencrypted PKCS#8 PEM. Only the public half is available without the
//! `client` feature.

use rsa::RsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, Result};

/// Modulus size for newly generated identities.
pub const RSA_KEY_BITS: usize = 2048;

/// Smallest modulus accepted from a peer.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// A recipient's public key. All that sealing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem.trim()).map_err(|_| CryptoError::InvalidKey)?;
        Self::checked(key)
    }

    fn checked(key: RsaPublicKey) -> Result<Self> {
        if key.n().bits() < MIN_RSA_KEY_BITS {
            return Err(CryptoError::InvalidKey);
        }
        Ok(Self(key))
    }

    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| CryptoError::InvalidKey)
    }

    /// Lowercase hex SHA-256 of the DER SubjectPublicKeyInfo, for comparing
    /// keys out of band.
    pub fn fingerprint(&self) -> Result<String> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|_| CryptoError::InvalidKey)?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }

    /// Modulus length in bytes; also the length of every wrapped key.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

#[cfg(feature = "client")]
pub use client::{Identity, PrivateKey, generate};

#[cfg(feature = "client")]
mod client {
    use aes_gcm::aead::OsRng;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
    use tracing::debug;
    use zeroize::Zeroizing;

    use vellum_types::IdentityId;

    use super::{PublicKey, RSA_KEY_BITS};
    use crate::error::{CryptoError, Result};

    /// A private key. Zeroized on drop by the underlying RSA type; never
    /// printed.
    pub struct PrivateKey(RsaPrivateKey);

    impl PrivateKey {
        pub fn from_pem(pem: &str) -> Result<Self> {
            let key = RsaPrivateKey::from_pkcs8_pem(pem.trim()).map_err(|_| CryptoError::InvalidKey)?;
            key.validate().map_err(|_| CryptoError::InvalidKey)?;
            PublicKey::checked(key.to_public_key())?;
            Ok(Self(key))
        }

        pub fn to_pem(&self) -> Result<Zeroizing<String>> {
            self.0
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|_| CryptoError::InvalidKey)
        }

        pub fn public_key(&self) -> PublicKey {
            PublicKey(self.0.to_public_key())
        }

        pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
            &self.0
        }
    }

    impl std::fmt::Debug for PrivateKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("PrivateKey(..)")
        }
    }

    /// An identity's key pair. Created once at registration.
    #[derive(Debug)]
    pub struct Identity {
        id: IdentityId,
        public_key: PublicKey,
        private_key: PrivateKey,
    }

    impl Identity {
        /// Rebuild an identity from stored PEM text. The public key must be
        /// the one derived from the private key.
        pub fn from_pem(id: IdentityId, public_pem: &str, private_pem: &str) -> Result<Self> {
            let public_key = PublicKey::from_pem(public_pem)?;
            let private_key = PrivateKey::from_pem(private_pem)?;
            if private_key.public_key() != public_key {
                return Err(CryptoError::InvalidKey);
            }
            Ok(Self {
                id,
                public_key,
                private_key,
            })
        }

        pub fn id(&self) -> IdentityId {
            self.id
        }

        pub fn public_key(&self) -> &PublicKey {
            &self.public_key
        }

        pub fn private_key(&self) -> &PrivateKey {
            &self.private_key
        }

        pub fn public_pem(&self) -> Result<String> {
            self.public_key.to_pem()
        }

        pub fn private_pem(&self) -> Result<Zeroizing<String>> {
            self.private_key.to_pem()
        }
    }

    /// Generate a fresh RSA-2048 identity from the OS random source.
    ///
    /// CPU-bound (tens of milliseconds in release builds); async callers
    /// should run it on a blocking thread.
    pub fn generate(id: IdentityId) -> Result<Identity> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|_| CryptoError::KeyGeneration)?;
        let public_key = PublicKey(private.to_public_key());
        debug!("generated {}-bit identity key for {}", RSA_KEY_BITS, id);
        Ok(Identity {
            id,
            public_key,
            private_key: PrivateKey(private),
        })
    }
}
