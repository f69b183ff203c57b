//! Error types for update attempts.

use deploy_guard_api::ApiError;
use deploy_guard_crypto::CryptoError;
use thiserror::Error;

/// Result type for update operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors that abort an update attempt.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Metadata request or artifact download failed, including timeouts
    /// and the size limit.
    #[error("download failed: {0}")]
    Download(String),

    /// Hash, signature, or bundle layout check failed.
    #[error("verification failed: {0}")]
    Verify(String),

    /// Filesystem swap failed; the previous artifact is back in place.
    #[error("apply failed: {0}")]
    Apply(String),

    /// Filesystem swap failed and restoring the backup failed too.
    /// The target may be missing or inconsistent.
    #[error("apply failed: {apply}; rollback failed: {rollback}")]
    Rollback { apply: String, rollback: String },

    /// No managed component has this slug.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// The authority has frozen updates for this license.
    #[error("updates are frozen")]
    Frozen,
}

impl UpdateError {
    /// Returns true for integrity failures (hash, signature, unsafe bundle).
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Verify(_))
    }

    /// Returns true if the attempt may succeed when simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Download(_))
    }
}

impl From<ApiError> for UpdateError {
    fn from(err: ApiError) -> Self {
        Self::Download(err.to_string())
    }
}

impl From<CryptoError> for UpdateError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::SizeLimitExceeded { limit } => {
                Self::Download(format!("artifact exceeds {limit} bytes"))
            }
            other => Self::Verify(other.to_string()),
        }
    }
}
