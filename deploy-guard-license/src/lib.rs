//! Licensing for deploy-guard.
//!
//! This module handles:
//! - Machine identity (hashed machine ID plus auxiliary signals)
//! - License verification against the authority, with a signed local cache
//! - One-time activation codes
//!
//! # Trust model
//!
//! The authority returns an opaque `public_data` payload and a detached
//! Ed25519 signature over it. The pair is cached per project/component and
//! re-checked with the embedded public key on every start, so a valid
//! cache lets the host start offline. A cache entry that fails the check is
//! indistinguishable from no cache at all.

mod activation;
mod cache;
mod device;
mod error;
mod verifier;

pub use activation::{activate, activate_with};
pub use cache::{CachedLicense, LicenseCache, CACHE_FILE_NAME, DEFAULT_CACHE_DIR};
pub use device::{hostname, DeviceFingerprint, IdentityProvider};
pub use error::{LicenseError, LicenseResult};
pub use verifier::{LicenseSubject, LicenseVerifier, Verification};
