//! Error types for the attestation subsystem.

/// Errors from decoding, encoding, or signing attestations.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    /// JSON (de)serialization of a statement or predicate failed.
    #[error("attestation JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope payload is not valid base64.
    #[error("invalid envelope payload encoding: {0}")]
    PayloadEncoding(String),

    /// The envelope carries a payload type other than in-toto JSON.
    #[error("unsupported envelope payload type `{0}`")]
    UnsupportedPayloadType(String),

    /// The predicate does not have the shape its type declares.
    #[error("predicate of type `{predicate_type}` could not be decoded: {reason}")]
    InvalidPredicate {
        /// The declared predicate type.
        predicate_type: String,
        /// What went wrong.
        reason: String,
    },

    /// Signing operation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Cryptographic key operation failed (generate or parse).
    #[error("key error: {0}")]
    KeyError(String),
}
