//! Authorization state machine.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

/// Authorization health of the guarded process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardState {
    /// Not yet verified.
    Init,
    /// Verified and in contact with the authority.
    Active,
    /// Authority unreachable; still allowed to operate for a while.
    Grace,
    /// Offline for longer than the grace period allows.
    Locked,
    /// Killed by the authority. Permanent for this process.
    Banned,
}

impl GuardState {
    /// Returns true if the host may keep operating.
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Active | Self::Grace)
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Active => "ACTIVE",
            Self::Grace => "GRACE",
            Self::Locked => "LOCKED",
            Self::Banned => "BANNED",
        })
    }
}

/// Lock-guarded [`GuardState`] with the only legal transitions.
///
/// The machine has no timers; the heartbeat loop decides when the grace
/// period is over.
#[derive(Debug)]
pub struct StateMachine {
    state: RwLock<GuardState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GuardState::Init),
        }
    }

    pub fn current(&self) -> GuardState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// INIT or GRACE -> ACTIVE.
    pub fn on_verify_success(&self) {
        self.transition("verify success", |s| match s {
            GuardState::Init | GuardState::Grace => Some(GuardState::Active),
            _ => None,
        });
    }

    /// GRACE -> ACTIVE; ACTIVE stays ACTIVE.
    pub fn on_heartbeat_ok(&self) {
        self.transition("heartbeat ok", |s| match s {
            GuardState::Grace | GuardState::Active => Some(GuardState::Active),
            _ => None,
        });
    }

    /// ACTIVE -> GRACE.
    pub fn on_heartbeat_fail(&self) {
        self.transition("heartbeat failed", |s| match s {
            GuardState::Active => Some(GuardState::Grace),
            _ => None,
        });
    }

    /// GRACE -> LOCKED.
    pub fn on_grace_period_expired(&self) {
        self.transition("grace period expired", |s| match s {
            GuardState::Grace => Some(GuardState::Locked),
            _ => None,
        });
    }

    /// Any state -> BANNED. Irreversible.
    pub fn on_kill(&self) {
        self.transition("kill", |_| Some(GuardState::Banned));
    }

    fn transition(&self, event: &str, next: impl FnOnce(GuardState) -> Option<GuardState>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        // Nothing leaves BANNED.
        if from == GuardState::Banned {
            return;
        }
        if let Some(to) = next(from) {
            if to != from {
                *state = to;
                match to {
                    GuardState::Locked | GuardState::Banned => {
                        warn!(%from, %to, event, "guard state changed")
                    }
                    _ => info!(%from, %to, event, "guard state changed"),
                }
            }
        }
    }
}
