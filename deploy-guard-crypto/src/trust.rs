//! Ed25519 trust verification against the authority's public key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// DER prefix of an Ed25519 `SubjectPublicKeyInfo` (RFC 8410), followed by
/// the 32 raw key bytes.
pub const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Validates detached signatures produced by the licensing authority.
///
/// Implementations must treat malformed input as a failed verification,
/// never as a panic.
pub trait TrustVerifier: Send + Sync {
    /// Returns true if `signature` is a valid signature over `message`.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 verifier bound to a single authority key.
///
/// The authority signs `SHA-256(message)` rather than the message itself,
/// so [`TrustVerifier::verify`] hashes first.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Creates a verifier from a raw 32-byte public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Creates a verifier from a `PUBLIC KEY` PEM block.
    ///
    /// The body may hold either the raw 32-byte key or a DER
    /// `SubjectPublicKeyInfo`.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        if !pem.contains("-----BEGIN") {
            return Err(CryptoError::InvalidPem("missing BEGIN line".to_string()));
        }

        let body: String = pem
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("-----"))
            .collect();

        let der = BASE64
            .decode(body.as_bytes())
            .map_err(|e| CryptoError::InvalidPem(format!("invalid base64 body: {e}")))?;

        match <[u8; 32]>::try_from(der.as_slice()) {
            Ok(raw) => Self::from_bytes(&raw),
            Err(_) => VerifyingKey::from_public_key_der(&der)
                .map(|key| Self { key })
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string())),
        }
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }
}

impl TrustVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        let digest = Sha256::digest(message);
        self.key.verify(&digest, &signature).is_ok()
    }
}

/// Decodes a standard-base64 signature as sent by the authority.
#[must_use]
pub fn decode_signature(encoded: &str) -> Option<Vec<u8>> {
    BASE64.decode(encoded.trim().as_bytes()).ok()
}
