mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{config, heartbeat_ok, identity, mount_heartbeat, mount_verify_ok, wait_until};
use deploy_guard::{Guard, GuardState};
use tempfile::TempDir;
use tracing::{Dispatch, Level};
use wiremock::{MockServer, ResponseTemplate};

/// Collects formatted log output.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    fn dispatch(&self) -> Dispatch {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .finish();
        Dispatch::new(subscriber)
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Logger injection ─────────────────────────────────────────────

#[tokio::test]
async fn injected_dispatch_sees_background_logs() {
    let server = MockServer::start().await;
    mount_verify_ok(&server).await;
    mount_heartbeat(&server, ResponseTemplate::new(503)).await;
    let cache = TempDir::new().unwrap();
    let capture = Capture::default();
    let guard = Guard::builder(config(&server, &cache))
        .identity(identity())
        .log_dispatch(capture.dispatch())
        .build()
        .unwrap();

    guard.start().await.unwrap();
    let g = &guard;
    assert!(
        wait_until(Duration::from_secs(3), move || async move {
            g.state() == GuardState::Locked && !g.is_running()
        })
        .await
    );

    let logs = capture.text();
    assert!(logs.contains("guard started"), "{logs}");
    assert!(logs.contains("license verified by authority"), "{logs}");
    assert!(logs.contains("running offline"), "{logs}");
    assert!(logs.contains("grace period expired"), "{logs}");
    assert!(logs.contains("heartbeat stopped exit=Locked"), "{logs}");
}

#[tokio::test]
async fn stopped_heartbeat_logs_exit_reason() {
    let server = MockServer::start().await;
    mount_verify_ok(&server).await;
    mount_heartbeat(&server, heartbeat_ok()).await;
    let cache = TempDir::new().unwrap();
    let capture = Capture::default();
    let guard = Guard::builder(config(&server, &cache))
        .identity(identity())
        .log_dispatch(capture.dispatch())
        .build()
        .unwrap();

    guard.start().await.unwrap();
    guard.stop();
    let g = &guard;
    assert!(wait_until(Duration::from_secs(3), move || async move { !g.is_running() }).await);

    let logs = capture.text();
    assert!(logs.contains("heartbeat stopped exit=Cancelled"), "{logs}");
    assert_eq!(guard.state(), GuardState::Active);
}
