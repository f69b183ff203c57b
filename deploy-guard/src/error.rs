//! Error types for the guard.

use deploy_guard_api::ApiError;
use deploy_guard_license::LicenseError;
use deploy_guard_update::UpdateError;
use thiserror::Error;

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors surfaced by [`crate::Guard`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// `start()` has not completed a successful verification yet.
    #[error("guard not activated")]
    NotActivated,

    #[error("system locked: offline grace period expired")]
    Locked,

    #[error("system banned")]
    Banned,

    #[error("license suspended")]
    LicenseSuspended,

    #[error("machine banned")]
    MachineBanned,

    /// Transport failure; retried by the heartbeat within the grace period.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid server response: {0}")]
    InvalidServerResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("update channel frozen")]
    UpdateFrozen,

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("OTA disabled for plugin: {0}")]
    PluginOtaDisabled(String),

    #[error("no update available for plugin: {0}")]
    NoPluginUpdate(String),

    #[error("plugin is not managed by this guard: {0}")]
    PluginNotManaged(String),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Authority-initiated terminations: the guard goes to BANNED.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Banned | Self::LicenseSuspended | Self::MachineBanned
        )
    }

    /// Failures that say nothing about the license itself.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::InvalidServerResponse(_) => true,
            Self::License(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Classifies a failed heartbeat. Only the ban and suspension codes
    /// are fatal; everything else counts as the authority being
    /// unreachable.
    pub(crate) fn from_heartbeat(err: ApiError) -> Self {
        if let Some(fatal) = err.code().and_then(Self::fatal_code) {
            return fatal;
        }
        match err {
            ApiError::Decode(msg) => Self::InvalidServerResponse(msg),
            other => Self::Network(other.to_string()),
        }
    }

    fn fatal_code(code: &str) -> Option<Self> {
        match code {
            "license_suspended" => Some(Self::LicenseSuspended),
            "machine_banned" => Some(Self::MachineBanned),
            "banned" | "license_banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

impl From<ApiError> for GuardError {
    fn from(err: ApiError) -> Self {
        if let Some(fatal) = err.code().and_then(Self::fatal_code) {
            return fatal;
        }
        match err {
            ApiError::Status {
                code: Some(code), ..
            } => Self::License(LicenseError::from_code(&code)),
            ApiError::Decode(msg) => Self::InvalidServerResponse(msg),
            ApiError::InvalidUrl(url) => Self::Config(format!("invalid server URL: {url}")),
            other => Self::Network(other.to_string()),
        }
    }
}
