//! Error types for stipend core primitives.

use thiserror::Error;

/// Errors from core primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("missing signature from {0}")]
    MissingSignature(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
