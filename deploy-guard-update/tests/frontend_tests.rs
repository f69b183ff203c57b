mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{
    authority_key, dir_entries, engine, mount_artifact, mount_meta, mount_signed, ota_config,
    sha256_hex, sign_digest, tar_gz, tar_gz_raw_entry, tar_gz_with_symlink, Recorder, FRONTEND,
};
use deploy_guard_update::{backup_path, ManagedComponent, OtaConfig, UpdateError};
use pretty_assertions::assert_eq;
use wiremock::MockServer;

fn live_dir(root: &Path) -> PathBuf {
    let live = root.join(FRONTEND);
    fs::create_dir(&live).unwrap();
    fs::write(live.join("old.html"), b"old").unwrap();
    live
}

// ── Directory swap ───────────────────────────────────────────────

#[tokio::test]
async fn bundle_is_extracted_and_swapped_in() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    mount_signed(
        &server,
        FRONTEND,
        tar_gz(&[
            ("index.html", b"<h1>v2</h1>"),
            ("assets/app.js", b"console.log(2)"),
        ]),
    )
    .await;

    let recorder = Recorder::default();
    let engine = engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &recorder,
    );
    engine.apply(FRONTEND, "1.2.0").await.unwrap();

    assert_eq!(fs::read(live.join("index.html")).unwrap(), b"<h1>v2</h1>");
    assert_eq!(fs::read(live.join("assets/app.js")).unwrap(), b"console.log(2)");
    assert!(!live.join("old.html").exists());
    assert!(backup_path(&live).join("old.html").exists());
    assert_eq!(engine.versions().get(FRONTEND).as_deref(), Some("1.2.0"));
    assert_eq!(engine.versions().primary(), "1.0.0");
    assert_eq!(
        recorder.events(),
        vec![
            "progress:web:requesting:0.0",
            "progress:web:downloading:0.3",
            "progress:web:extracting:0.5",
            "progress:web:verifying:0.8",
            "progress:web:applying:0.9",
            "progress:web:completed:1.0",
            "result:web:unknown->1.2.0:ok",
        ]
    );
    // Only the live tree and its backup remain; the staging dir is gone.
    assert_eq!(dir_entries(dir.path()), vec!["web", "web.bak"]);
}

#[tokio::test]
async fn missing_live_dir_is_created() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("nested").join(FRONTEND);
    mount_signed(&server, FRONTEND, tar_gz(&[("index.html", b"hello")])).await;

    engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &Recorder::default(),
    )
    .apply(FRONTEND, "1.0.0")
    .await
    .unwrap();

    assert_eq!(fs::read(live.join("index.html")).unwrap(), b"hello");
    assert!(!backup_path(&live).exists());
}

#[tokio::test]
async fn symlinks_are_skipped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    mount_signed(
        &server,
        FRONTEND,
        tar_gz_with_symlink("passwd", "/etc/passwd", &[("index.html", b"ok")]),
    )
    .await;

    engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &Recorder::default(),
    )
    .apply(FRONTEND, "1.2.0")
    .await
    .unwrap();

    assert!(live.join("index.html").exists());
    assert!(fs::symlink_metadata(live.join("passwd")).is_err());
}

// ── Bundle integrity ─────────────────────────────────────────────

#[tokio::test]
async fn traversal_entry_is_never_written() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    mount_signed(
        &server,
        FRONTEND,
        tar_gz_raw_entry("../evil.txt", b"pwned", &[("index.html", b"ok")]),
    )
    .await;

    let recorder = Recorder::default();
    let engine = engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &recorder,
    );
    let err = engine.apply(FRONTEND, "1.2.0").await.unwrap_err();

    assert!(matches!(err, UpdateError::Verify(_)), "{err}");
    assert!(!dir.path().join("evil.txt").exists());
    assert_eq!(dir_entries(&live), vec!["old.html"]);
    assert_eq!(dir_entries(dir.path()), vec!["web"]);
    assert_eq!(engine.versions().get(FRONTEND).as_deref(), Some("unknown"));
    assert!(recorder.events().contains(&"failure:web:integrity".to_string()));
}

#[tokio::test]
async fn bundle_hash_mismatch_leaves_live_dir() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    let bundle = tar_gz(&[("index.html", b"evil")]);
    let declared = sha256_hex(b"the real bundle");
    mount_meta(
        &server,
        FRONTEND,
        "/artifacts/web",
        &declared,
        Some(&sign_digest(&authority_key(), &declared)),
    )
    .await;
    mount_artifact(&server, "/artifacts/web", bundle).await;

    let err = engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &Recorder::default(),
    )
    .apply(FRONTEND, "1.2.0")
    .await
    .unwrap_err();

    assert!(err.is_integrity());
    assert_eq!(dir_entries(&live), vec!["old.html"]);
    assert_eq!(dir_entries(dir.path()), vec!["web"]);
}

#[tokio::test]
async fn corrupt_bundle_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    mount_signed(&server, FRONTEND, b"this is not gzip".to_vec()).await;

    let err = engine(
        &server,
        ota_config(dir.path()),
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &Recorder::default(),
    )
    .apply(FRONTEND, "1.2.0")
    .await
    .unwrap_err();

    assert!(err.is_integrity(), "{err}");
    assert_eq!(dir_entries(&live), vec!["old.html"]);
}

#[tokio::test]
async fn unsigned_bundle_requires_opt_out() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    let bundle = tar_gz(&[("index.html", b"v2")]);
    mount_meta(&server, FRONTEND, "/artifacts/web", &sha256_hex(&bundle), None).await;
    mount_artifact(&server, "/artifacts/web", bundle).await;
    let components = vec![ManagedComponent::directory(FRONTEND, &live)];

    let strict = engine(&server, ota_config(dir.path()), components.clone(), &Recorder::default());
    let err = strict.apply(FRONTEND, "1.2.0").await.unwrap_err();
    assert!(err.is_integrity());
    assert!(live.join("old.html").exists());

    let lenient_config = OtaConfig {
        require_bundle_signature: false,
        ..ota_config(dir.path())
    };
    let lenient = engine(&server, lenient_config, components, &Recorder::default());
    lenient.apply(FRONTEND, "1.2.0").await.unwrap();
    assert_eq!(fs::read(live.join("index.html")).unwrap(), b"v2");
}

#[tokio::test]
async fn oversized_bundle_is_aborted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    // xorshift output so gzip cannot shrink it under the limit
    let mut state = 0x2545_f491_u32;
    let big: Vec<u8> = (0..64 * 1024)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();
    mount_signed(&server, FRONTEND, tar_gz(&[("blob.bin", &big)])).await;

    let config = OtaConfig {
        max_artifact_bytes: 1024,
        ..ota_config(dir.path())
    };
    let err = engine(
        &server,
        config,
        vec![ManagedComponent::directory(FRONTEND, &live)],
        &Recorder::default(),
    )
    .apply(FRONTEND, "1.2.0")
    .await
    .unwrap_err();

    assert!(matches!(err, UpdateError::Download(_)), "{err}");
    assert_eq!(dir_entries(dir.path()), vec!["web"]);
}

// ── Post-update hook ─────────────────────────────────────────────

#[tokio::test]
async fn hook_runs_after_result_and_failure_keeps_update() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let live = live_dir(dir.path());
    mount_signed(&server, FRONTEND, tar_gz(&[("index.html", b"v2")])).await;

    let recorder = Recorder::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = calls.clone();
    let hook_recorder = recorder.clone();
    let component = ManagedComponent::directory(FRONTEND, &live).with_post_update(move || {
        hook_calls.fetch_add(1, Ordering::SeqCst);
        hook_recorder.push("hook");
        anyhow::bail!("reload failed")
    });

    let engine = engine(&server, ota_config(dir.path()), vec![component], &recorder);
    engine.apply(FRONTEND, "1.2.0").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read(live.join("index.html")).unwrap(), b"v2");
    assert_eq!(engine.versions().get(FRONTEND).as_deref(), Some("1.2.0"));
    let events = recorder.events();
    assert_eq!(
        &events[events.len() - 2..],
        &["result:web:unknown->1.2.0:ok", "hook"]
    );
}
