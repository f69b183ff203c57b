#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use deploy_guard_api::{endpoints, AuthorityClient, UpdateInfo};
use deploy_guard_crypto::Ed25519Verifier;
use deploy_guard_update::{
    ComponentVersions, ManagedComponent, OtaConfig, RequestScope, UpdateCallbacks, UpdateEngine,
    UpdateError, UpdateReport, UpdateStage,
};
use ed25519_dalek::{Signer, SigningKey};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use sha2::{Digest, Sha256};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIMARY: &str = "server";
pub const FRONTEND: &str = "web";

pub fn authority_key() -> SigningKey {
    SigningKey::from_bytes(&[
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ])
}

pub fn rogue_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Signature over the hex digest string, as the authority issues it.
pub fn sign_digest(key: &SigningKey, digest_hex: &str) -> String {
    BASE64.encode(key.sign(&Sha256::digest(digest_hex.as_bytes())).to_bytes())
}

// ── Bundles ──────────────────────────────────────────────────────

pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Builds an archive with an entry name written verbatim into the header,
/// bypassing the builder's own path checks.
pub fn tar_gz_raw_entry(raw_name: &str, data: &[u8], then: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..raw_name.len()].copy_from_slice(raw_name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
    for (name, data) in then {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn tar_gz_with_symlink(link: &str, points_to: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, link, points_to).unwrap();
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

// ── Authority stubs ──────────────────────────────────────────────

/// Serves download metadata for `component` pointing at `artifact_path`.
pub async fn mount_meta(
    server: &MockServer,
    component: &str,
    artifact_path: &str,
    sha256: &str,
    signature: Option<&str>,
) {
    Mock::given(method("POST"))
        .and(path(endpoints::UPDATE_DOWNLOAD))
        .and(body_partial_json(json!({ "component_slug": component })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "download_url": artifact_path,
            "sha256": sha256,
            "signature": signature,
        })))
        .mount(server)
        .await;
}

pub async fn mount_artifact(server: &MockServer, artifact_path: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(artifact_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Mounts a correctly hashed and signed artifact for `component`.
pub async fn mount_signed(server: &MockServer, component: &str, body: Vec<u8>) {
    let digest = sha256_hex(&body);
    let artifact_path = format!("/artifacts/{component}");
    mount_meta(
        server,
        component,
        &artifact_path,
        &digest,
        Some(&sign_digest(&authority_key(), &digest)),
    )
    .await;
    mount_artifact(server, &artifact_path, body).await;
}

// ── Engine ───────────────────────────────────────────────────────

/// Records callback invocations as compact strings.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> UpdateCallbacks {
        let progress = self.events.clone();
        let result = self.events.clone();
        let failure = self.events.clone();
        let available = self.events.clone();
        UpdateCallbacks {
            on_progress: Some(Arc::new(move |component: &str, stage: UpdateStage, fraction: f64| {
                progress
                    .lock()
                    .unwrap()
                    .push(format!("progress:{component}:{stage}:{fraction:.1}"));
            })),
            on_result: Some(Arc::new(move |report: &UpdateReport<'_>| {
                let outcome = if report.succeeded() { "ok" } else { "failed" };
                result.lock().unwrap().push(format!(
                    "result:{}:{}->{}:{outcome}",
                    report.component, report.old_version, report.new_version
                ));
            })),
            on_failure: Some(Arc::new(move |component: &str, err: &UpdateError| {
                let kind = if err.is_integrity() { "integrity" } else { "other" };
                failure
                    .lock()
                    .unwrap()
                    .push(format!("failure:{component}:{kind}"));
            })),
            on_available: Some(Arc::new(move |info: &UpdateInfo| {
                available
                    .lock()
                    .unwrap()
                    .push(format!("available:{}:{}", info.component, info.latest));
            })),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

pub fn ota_config(dir: &Path) -> OtaConfig {
    OtaConfig {
        enabled: true,
        primary_target: Some(dir.join(PRIMARY)),
        ..Default::default()
    }
}

pub fn engine(
    server: &MockServer,
    config: OtaConfig,
    components: Vec<ManagedComponent>,
    recorder: &Recorder,
) -> Arc<UpdateEngine> {
    let trust = Ed25519Verifier::from_bytes(&authority_key().verifying_key().to_bytes()).unwrap();
    let versions = Arc::new(ComponentVersions::new(
        PRIMARY,
        components.iter().map(|c| c.slug.clone()),
    ));
    versions.set_primary("1.0.0");
    let scope = RequestScope {
        license_key: "LK-TEST-0001".to_string(),
        machine_id: "sha256:feedface".to_string(),
        project_slug: "acme".to_string(),
    };
    Arc::new(
        UpdateEngine::new(
            AuthorityClient::new(server.uri()).unwrap(),
            Arc::new(trust),
            scope,
            config,
            versions,
        )
        .with_components(components)
        .with_callbacks(recorder.callbacks()),
    )
}

/// Names of the entries directly inside `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
