//! Error types for tokenvault.
//!
//! Every variant is a distinct failure mode of the codec pipeline. Crypto
//! messages are intentionally minimal: they signal *what* failed without
//! revealing key material, tokens, or plaintext.

use thiserror::Error;

use crate::store::StoreError;

/// Coarse classification of a [`CodecError`].
///
/// Callers use this to route a failure to the right operator action: a
/// `Crypto` failure means a ciphertext or key problem, a `Store` failure
/// means the content store is unreachable or inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload was not structured content that can be tokenized.
    Decode,
    /// The content store failed an insert or retrieve.
    Store,
    /// Encryption, decryption, or token authentication failed.
    Crypto,
    /// A protected payload carried no key-id metadata.
    MissingKeyId,
    /// The key resolver has no material for the requested id.
    UnknownKeyId,
    /// A secondary transform stage (compression, framing) failed.
    Transform,
    /// The transform chain was assembled in an invalid order.
    Pipeline,
}

/// The single error type for all codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload bytes could not be parsed as JSON.
    #[error("payload is not structured data: {0}")]
    Decode(#[from] serde_json::Error),

    /// The payload parsed, but is not a JSON object.
    #[error("payload is not a structured mapping")]
    NotAnObject,

    /// The payload already has a top-level field named like the store's
    /// identity field (`_id`), which the codec would have to overwrite.
    #[error("payload uses reserved field: {0}")]
    ReservedField(&'static str),

    /// Content store failure, including an unknown token.
    #[error("content store: {0}")]
    Store(#[from] StoreError),

    /// A cryptographic key was invalid (wrong length, malformed, etc.).
    #[error("invalid key")]
    InvalidKey,

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailure,

    /// Decryption failed. This includes: wrong key, tampered ciphertext,
    /// or corrupted GCM authentication tag.
    #[error("decryption failed")]
    DecryptionFailure,

    /// Decryption succeeded but the plaintext is not a token.
    #[error("decrypted token is malformed")]
    MalformedToken,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// A payload marked as protected has no key-id metadata.
    #[error("no encryption key id")]
    MissingKeyId,

    /// The resolver has no key material for this id.
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    /// Compression or decompression failed.
    #[error("compression: {0}")]
    Compression(#[from] std::io::Error),

    /// A framed payload was truncated or oversized.
    #[error("malformed payload frame")]
    MalformedFrame,

    /// The transform chain violates stage placement rules.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl CodecError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::NotAnObject | Self::ReservedField(_) => ErrorKind::Decode,
            Self::Store(_) => ErrorKind::Store,
            Self::InvalidKey
            | Self::EncryptionFailure
            | Self::DecryptionFailure
            | Self::MalformedToken
            | Self::RandomnessFailure => ErrorKind::Crypto,
            Self::MissingKeyId => ErrorKind::MissingKeyId,
            Self::UnknownKeyId(_) => ErrorKind::UnknownKeyId,
            Self::Compression(_) | Self::MalformedFrame => ErrorKind::Transform,
            Self::InvalidPipeline(_) => ErrorKind::Pipeline,
        }
    }

    /// True if the content store has no record for the requested token.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}
