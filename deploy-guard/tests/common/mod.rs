#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use deploy_guard::{DeviceFingerprint, GracePolicy, Guard, GuardConfig, IdentityProvider};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LICENSE_KEY: &str = "LK-TEST-0001";
pub const PROJECT: &str = "acme";
pub const COMPONENT: &str = "server";
pub const MACHINE_ID: &str = "sha256:feedface";
pub const PUBLIC_DATA: &str = r#"{"plan":"pro"}"#;

pub const VERIFY: &str = "/api/v1/verify";
pub const HEARTBEAT: &str = "/api/v1/heartbeat";
pub const UPDATE_DOWNLOAD: &str = "/api/v1/update/download";
pub const VERSION_RESOLVE: &str = "/api/v1/version/resolve";
pub const PLUGIN_CATALOG: &str = "/api/v1/plugins/catalog";
pub const FEEDBACKS: &str = "/api/v1/feedbacks";
pub const FEEDBACK_UPLOAD: &str = "/api/v1/feedbacks/upload";
pub const RELEASE_NOTES: &str = "/api/v1/feedbacks/release-notes";

pub fn authority_key() -> SigningKey {
    SigningKey::from_bytes(&[
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ])
}

pub fn rogue_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// PEM block with the raw authority key as its body.
pub fn public_key_pem() -> String {
    format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
        BASE64.encode(authority_key().verifying_key().to_bytes())
    )
}

/// Base64 signature over SHA-256 of `message`, as the authority produces.
pub fn sign_b64(key: &SigningKey, message: &[u8]) -> String {
    BASE64.encode(key.sign(&Sha256::digest(message)).to_bytes())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn identity() -> Arc<dyn IdentityProvider> {
    let mut aux = BTreeMap::new();
    aux.insert("os".to_string(), "linux".to_string());
    aux.insert("arch".to_string(), "amd64".to_string());
    Arc::new(DeviceFingerprint::from_parts(MACHINE_ID, aux))
}

/// Fast heartbeat, 200ms grace.
pub fn config(server: &MockServer, cache: &TempDir) -> GuardConfig {
    GuardConfig {
        server_url: server.uri(),
        license_key: LICENSE_KEY.to_string(),
        public_key_pem: public_key_pem(),
        project_slug: PROJECT.to_string(),
        component_slug: COMPONENT.to_string(),
        heartbeat_interval: Duration::from_millis(50),
        grace: GracePolicy {
            max_offline_duration: Duration::from_millis(200),
            warning_interval: Duration::from_millis(100),
        },
        cache_root: Some(cache.path().to_path_buf()),
        ..Default::default()
    }
}

pub fn guard(config: GuardConfig) -> Guard {
    Guard::builder(config).identity(identity()).build().unwrap()
}

// ── Authority stubs ──────────────────────────────────────────────

pub async fn mount_verify_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(VERIFY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "valid",
            "public_data": PUBLIC_DATA,
            "signature": sign_b64(&authority_key(), PUBLIC_DATA.as_bytes()),
        })))
        .mount(server)
        .await;
}

pub async fn mount_heartbeat(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(HEARTBEAT))
        .respond_with(template)
        .mount(server)
        .await;
}

pub fn heartbeat_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" }))
}

/// Number of heartbeats the server has received so far.
pub async fn heartbeat_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == HEARTBEAT)
        .count()
}

/// Polls `cond` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
