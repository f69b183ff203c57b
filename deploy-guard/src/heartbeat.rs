//! Background heartbeat loop.
//!
//! One task per started guard. Each wake it reports component versions to
//! the authority, feeds the outcome into the [`StateMachine`] and hands
//! update notifications to the [`UpdateEngine`]. The loop owns the grace
//! clock: the state machine only learns that the grace period is over.

use std::sync::Arc;
use std::time::Duration;

use deploy_guard_api::{endpoints, AuthorityClient, HeartbeatRequest, HeartbeatResponse};
use deploy_guard_update::{ComponentVersions, RequestScope, UpdateEngine};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GracePolicy;
use crate::error::{GuardError, GuardResult};
use crate::state::StateMachine;

/// Why the heartbeat loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatExit {
    /// `stop()` was called or the guard was dropped.
    Cancelled,
    /// The grace period ran out.
    Locked,
    /// The authority killed the license.
    Banned,
}

/// Applies ±10% uniform jitter to `interval`. Saturates instead of
/// overflowing for intervals near `Duration::MAX`.
pub(crate) fn jittered(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(interval)
}

/// Grace bookkeeping across consecutive failures.
#[derive(Debug, Default)]
struct GraceClock {
    started: Option<Instant>,
    last_warning: Option<Instant>,
}

impl GraceClock {
    fn reset(&mut self) {
        self.started = None;
        self.last_warning = None;
    }

    /// Records a failure and returns the time spent offline so far.
    fn record_failure(&mut self, now: Instant) -> Duration {
        let started = *self.started.get_or_insert(now);
        now.duration_since(started)
    }

    fn should_warn(&mut self, now: Instant, every: Duration) -> bool {
        match self.last_warning {
            Some(at) if now.duration_since(at) < every => false,
            _ => {
                self.last_warning = Some(now);
                true
            }
        }
    }
}

pub(crate) struct HeartbeatScheduler {
    client: AuthorityClient,
    scope: RequestScope,
    versions: Arc<ComponentVersions>,
    state: Arc<StateMachine>,
    engine: Arc<UpdateEngine>,
    interval: Duration,
    grace: GracePolicy,
}

impl HeartbeatScheduler {
    pub(crate) fn new(
        client: AuthorityClient,
        scope: RequestScope,
        state: Arc<StateMachine>,
        engine: Arc<UpdateEngine>,
        interval: Duration,
        grace: GracePolicy,
    ) -> Self {
        Self {
            client,
            scope,
            versions: Arc::clone(engine.versions()),
            state,
            engine,
            interval,
            grace,
        }
    }

    /// Sends one heartbeat. A `kill` status is reported as [`GuardError::Banned`].
    pub(crate) async fn send(&self) -> GuardResult<HeartbeatResponse> {
        let request = HeartbeatRequest {
            license_key: self.scope.license_key.clone(),
            machine_id: self.scope.machine_id.clone(),
            project_slug: self.scope.project_slug.clone(),
            components: self.versions.snapshot(),
        };
        let response: HeartbeatResponse = self
            .client
            .post_json(endpoints::HEARTBEAT, &request)
            .await
            .map_err(GuardError::from_heartbeat)?;

        if response.is_kill() {
            warn!(
                reason = response.reason.as_deref().unwrap_or_default(),
                message = response.message.as_deref().unwrap_or_default(),
                "authority sent kill"
            );
            return Err(GuardError::Banned);
        }
        Ok(response)
    }

    /// Runs until cancelled, locked or banned.
    pub(crate) async fn run(self, mut cancel: watch::Receiver<bool>) -> HeartbeatExit {
        let mut grace = GraceClock::default();
        debug!(interval = ?self.interval, "heartbeat loop started");

        loop {
            if *cancel.borrow_and_update() {
                return HeartbeatExit::Cancelled;
            }
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    // A dropped sender means the guard is gone.
                    if changed.is_err() || *cancel.borrow() {
                        debug!("heartbeat loop cancelled");
                        return HeartbeatExit::Cancelled;
                    }
                    continue;
                }
                _ = tokio::time::sleep(jittered(self.interval)) => {}
            }

            match self.send().await {
                Ok(response) => {
                    self.state.on_heartbeat_ok();
                    if grace.started.is_some() {
                        info!("authority reachable again");
                    }
                    grace.reset();
                    self.handle_updates(response);
                }
                Err(err) if err.is_fatal() => {
                    self.state.on_kill();
                    return HeartbeatExit::Banned;
                }
                Err(err) => {
                    self.state.on_heartbeat_fail();
                    let now = Instant::now();
                    let offline = grace.record_failure(now);
                    if offline > self.grace.max_offline_duration {
                        warn!(error = %err, ?offline, "grace period expired");
                        self.state.on_grace_period_expired();
                        return HeartbeatExit::Locked;
                    }
                    if grace.should_warn(now, self.grace.warning_interval) {
                        let remaining = self.grace.max_offline_duration.saturating_sub(offline);
                        warn!(error = %err, ?remaining, "heartbeat failed, running offline");
                    } else {
                        debug!(error = %err, "heartbeat failed");
                    }
                }
            }
        }
    }

    fn handle_updates(&self, response: HeartbeatResponse) {
        self.engine.set_frozen(response.update_frozen);
        if !self.engine.config().enabled || response.update_frozen {
            if !response.updates.is_empty() {
                debug!(
                    count = response.updates.len(),
                    frozen = response.update_frozen,
                    "not dispatching updates"
                );
            }
            return;
        }
        for update in response.updates {
            // Spawned attempts report through the engine callbacks.
            let _ = self.engine.dispatch(update);
        }
    }
}
