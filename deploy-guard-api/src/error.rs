//! Error types for authority requests.

use thiserror::Error;

/// Result type for authority requests.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the authority.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-200 status.
    #[error("unexpected status {status}{}", code_suffix(.code))]
    Status { status: u16, code: Option<String> },

    /// The body was not the JSON we expected.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The configured server URL is unusable.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Returns the server's symbolic error code, if the response carried one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}
