use thiserror::Error;

use vellum_types::EnvelopeError;

/// Failures surfaced by seal/open and the primitives under them.
///
/// Messages are deliberately fixed strings: they say which stage failed but
/// never which byte or key caused it. Anything shown to an end user should
/// collapse all of these into one "message could not be decrypted" text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key generation failed: entropy or algorithm unavailable")]
    KeyGeneration,

    #[error("payload of {len} bytes exceeds the {max}-byte wrap limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("wrapped key could not be unwrapped")]
    Unwrap,

    #[error("message body failed authentication")]
    Integrity,

    #[error("malformed envelope: {0}")]
    Decoding(&'static str),

    #[error("unsupported algorithm id {0}")]
    UnsupportedAlgorithm(u8),

    #[error("invalid key material")]
    InvalidKey,
}

impl From<EnvelopeError> for CryptoError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Truncated => Self::Decoding("truncated"),
            EnvelopeError::TrailingBytes => Self::Decoding("trailing bytes"),
            EnvelopeError::FieldTooLong => Self::Decoding("field too long"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
