//! Wire protocol and HTTP client for the licensing authority.
//!
//! All endpoints speak JSON over HTTPS. The client is a thin wrapper over
//! `reqwest` that resolves paths against the configured server URL, decodes
//! bodies, and turns non-200 responses into [`ApiError::Status`] with the
//! server's symbolic error code attached when one is present.

mod client;
mod error;
pub mod protocol;

pub use client::AuthorityClient;
pub use error::{ApiError, ApiResult};
pub use protocol::*;
