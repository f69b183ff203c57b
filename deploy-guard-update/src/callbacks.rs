//! Progress and outcome notifications for the embedding application.

use std::fmt;
use std::sync::Arc;

use deploy_guard_api::UpdateInfo;

use crate::error::UpdateError;

/// Pipeline stage reported through `on_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Requesting,
    Downloading,
    Extracting,
    Verifying,
    Applying,
    Completed,
}

impl UpdateStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requesting => "requesting",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Verifying => "verifying",
            Self::Applying => "applying",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of one attempt, passed to `on_result`.
#[derive(Debug, Clone, Copy)]
pub struct UpdateReport<'a> {
    pub component: &'a str,
    pub old_version: &'a str,
    pub new_version: &'a str,
    /// `None` on success.
    pub error: Option<&'a UpdateError>,
}

impl UpdateReport<'_> {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub type ProgressCallback = Arc<dyn Fn(&str, UpdateStage, f64) + Send + Sync>;
pub type ResultCallback = Arc<dyn Fn(&UpdateReport<'_>) + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(&str, &UpdateError) + Send + Sync>;
pub type AvailableCallback = Arc<dyn Fn(&UpdateInfo) + Send + Sync>;

/// Optional hooks invoked by the update engine.
///
/// Callbacks run on the task performing the update and should return
/// quickly.
#[derive(Clone, Default)]
pub struct UpdateCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_result: Option<ResultCallback>,
    pub on_failure: Option<FailureCallback>,
    pub on_available: Option<AvailableCallback>,
}

impl UpdateCallbacks {
    pub(crate) fn progress(&self, component: &str, stage: UpdateStage, fraction: f64) {
        if let Some(cb) = &self.on_progress {
            cb(component, stage, fraction);
        }
    }

    pub(crate) fn result(&self, report: &UpdateReport<'_>) {
        if let Some(cb) = &self.on_result {
            cb(report);
        }
    }

    pub(crate) fn failure(&self, component: &str, err: &UpdateError) {
        if let Some(cb) = &self.on_failure {
            cb(component, err);
        }
    }

    pub(crate) fn available(&self, info: &UpdateInfo) {
        if let Some(cb) = &self.on_available {
            cb(info);
        }
    }
}

impl fmt::Debug for UpdateCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_result", &self.on_result.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_available", &self.on_available.is_some())
            .finish()
    }
}
