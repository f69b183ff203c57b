//! Error types for the licensing module.

use deploy_guard_api::ApiError;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// License unknown, inactive, or rejected for an unrecognized reason.
    #[error("license invalid{}", code_suffix(.code))]
    Invalid { code: Option<String> },

    /// License has expired.
    #[error("license expired")]
    Expired,

    /// License does not cover this project.
    #[error("project not authorized")]
    ProjectNotAuthorized,

    /// Machine limit for this license reached.
    #[error("max machines exceeded")]
    MaxMachinesExceeded,

    /// This machine has been banned by the authority.
    #[error("machine banned")]
    MachineBanned,

    /// License suspended by the authority.
    #[error("license suspended")]
    Suspended,

    /// Transport failure; safe to retry later.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with something we could not understand.
    #[error("invalid server response: {0}")]
    InvalidServerResponse(String),

    /// Activation code unknown.
    #[error("activation code not found")]
    CdkNotFound,

    /// Activation code already redeemed.
    #[error("activation code already used")]
    CdkAlreadyUsed,

    /// Activation code revoked.
    #[error("activation code revoked")]
    CdkRevoked,

    /// Cache storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed input.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LicenseError {
    /// Maps an authority error code to a typed error.
    ///
    /// Unknown codes become [`LicenseError::Invalid`] with the raw code kept.
    pub fn from_code(code: &str) -> Self {
        match code {
            "license_not_found" | "license_inactive" => Self::Invalid { code: None },
            "license_expired" => Self::Expired,
            "project_not_authorized" => Self::ProjectNotAuthorized,
            "max_machines_exceeded" => Self::MaxMachinesExceeded,
            "machine_banned" => Self::MachineBanned,
            "license_suspended" => Self::Suspended,
            "cdk_not_found" => Self::CdkNotFound,
            "cdk_already_used" => Self::CdkAlreadyUsed,
            "cdk_revoked" => Self::CdkRevoked,
            other => Self::Invalid {
                code: Some(other.to_string()),
            },
        }
    }

    /// Returns true for failures that say nothing about the license itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::InvalidServerResponse(_))
    }
}

impl From<ApiError> for LicenseError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status {
                code: Some(code), ..
            } => Self::from_code(&code),
            ApiError::Decode(msg) => Self::InvalidServerResponse(msg),
            ApiError::InvalidUrl(url) => Self::Config(format!("invalid server URL: {url}")),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(": {c}")).unwrap_or_default()
}
