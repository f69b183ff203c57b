//! Error types for trust verification and digests.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while loading keys or hashing artifacts.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The PEM envelope could not be decoded.
    #[error("invalid public key PEM: {0}")]
    InvalidPem(String),

    /// The key bytes are not a valid Ed25519 public key.
    #[error("invalid ed25519 public key: {0}")]
    InvalidPublicKey(String),

    /// A streamed artifact grew past its configured ceiling.
    #[error("artifact exceeds size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    /// Reading the data to hash failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
