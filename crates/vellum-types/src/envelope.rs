//! The on-wire envelope: one recipient's wrapped key plus the shared body.
//!
//! Binary layout (all integers big-endian):
//!
//! ```text
//! alg:u8 | wrapped_len:u16 | wrapped_key | nonce:[u8; 12] | body_len:u32 | body
//! ```
//!
//! The JSON form uses the same field names with byte fields as standard
//! base64 strings. Neither codec interprets `algorithm_id`; an unknown id
//! round-trips unchanged and is rejected when the envelope is opened.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::models::IdentityId;

/// Nonce length carried by every envelope.
pub const NONCE_SIZE: usize = 12;

/// Upper bound on a wrapped key (an 8192-bit RSA modulus).
pub const MAX_WRAPPED_KEY_LEN: usize = 1024;

/// Upper bound on a sealed body.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

const HEADER_LEN: usize = 1 + 2;

/// Result of sealing one message: one envelope per recipient.
pub type EnvelopeSet = BTreeMap<IdentityId, Envelope>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope is truncated")]
    Truncated,
    #[error("envelope has trailing bytes")]
    TrailingBytes,
    #[error("envelope field exceeds its size limit")]
    FieldTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub algorithm_id: u8,
    #[serde(with = "b64_bytes")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "b64_nonce")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "b64_bytes")]
    pub body: Vec<u8>,
}

impl Envelope {
    /// Encode to the binary wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        if self.wrapped_key.len() > MAX_WRAPPED_KEY_LEN || self.body.len() > MAX_BODY_LEN {
            return Err(EnvelopeError::FieldTooLong);
        }

        let mut out = Vec::with_capacity(
            HEADER_LEN + self.wrapped_key.len() + NONCE_SIZE + 4 + self.body.len(),
        );
        out.push(self.algorithm_id);
        out.extend_from_slice(&(self.wrapped_key.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    /// Decode from the binary wire format. Every field boundary is checked
    /// before anything is copied.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvelopeError> {
        let mut reader = Reader { data };

        let algorithm_id = reader.take(1)?[0];

        let wrapped_len = u16::from_be_bytes(reader.array::<2>()?) as usize;
        if wrapped_len > MAX_WRAPPED_KEY_LEN {
            return Err(EnvelopeError::FieldTooLong);
        }
        let wrapped_key = reader.take(wrapped_len)?.to_vec();

        let nonce = reader.array::<NONCE_SIZE>()?;

        let body_len = u32::from_be_bytes(reader.array::<4>()?) as usize;
        if body_len > MAX_BODY_LEN {
            return Err(EnvelopeError::FieldTooLong);
        }
        let body = reader.take(body_len)?.to_vec();

        if !reader.data.is_empty() {
            return Err(EnvelopeError::TrailingBytes);
        }

        Ok(Self {
            algorithm_id,
            wrapped_key,
            nonce,
            body,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EnvelopeError> {
        if self.data.len() < n {
            return Err(EnvelopeError::Truncated);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EnvelopeError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

mod b64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        B64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_nonce {
    use super::*;

    pub fn serialize<S: Serializer>(nonce: &[u8; NONCE_SIZE], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(nonce))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; NONCE_SIZE], D::Error> {
        let bytes = super::b64_bytes::deserialize(d)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("nonce must be 12 bytes"))
    }
}
