//! Trust primitives for deploy-guard.
//!
//! Two black boxes consumed by the rest of the workspace:
//! - [`TrustVerifier`]: checks a detached Ed25519 signature made by the
//!   licensing authority. The authority signs the SHA-256 digest of a
//!   message, so verifiers hash before checking.
//! - [`StreamDigest`]: an incremental SHA-256 with a hard byte ceiling, fed
//!   chunk by chunk while an artifact downloads.

mod digest;
mod error;
mod trust;

pub use digest::{sha256_file, sha256_hex, StreamDigest};
pub use error::{CryptoError, CryptoResult};
pub use trust::{decode_signature, Ed25519Verifier, TrustVerifier, ED25519_SPKI_PREFIX};
