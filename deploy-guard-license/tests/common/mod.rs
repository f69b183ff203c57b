#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use deploy_guard_crypto::{Ed25519Verifier, TrustVerifier};
use deploy_guard_license::{DeviceFingerprint, IdentityProvider};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

pub const LICENSE_KEY: &str = "LK-TEST-0001";
pub const PROJECT: &str = "acme";
pub const COMPONENT: &str = "server";

pub fn authority_key() -> SigningKey {
    SigningKey::from_bytes(&[
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ])
}

pub fn rogue_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// Base64 signature over SHA-256 of `message`, as the authority produces.
pub fn sign_b64(key: &SigningKey, message: &[u8]) -> String {
    BASE64.encode(key.sign(&Sha256::digest(message)).to_bytes())
}

pub fn trust() -> Arc<dyn TrustVerifier> {
    let bytes = authority_key().verifying_key().to_bytes();
    Arc::new(Ed25519Verifier::from_bytes(&bytes).unwrap())
}

pub fn identity() -> Arc<dyn IdentityProvider> {
    let mut aux = BTreeMap::new();
    aux.insert("os".to_string(), "linux".to_string());
    aux.insert("arch".to_string(), "amd64".to_string());
    Arc::new(DeviceFingerprint::from_parts("sha256:feedface", aux))
}
