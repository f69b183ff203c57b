//! Request and response bodies for every authority endpoint.
//!
//! Field names match the server's snake_case JSON. Response types default
//! every field so that older or newer servers omitting a field still decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Endpoint paths, relative to the server URL.
pub mod endpoints {
    pub const VERIFY: &str = "/api/v1/verify";
    pub const HEARTBEAT: &str = "/api/v1/heartbeat";
    pub const UPDATE_DOWNLOAD: &str = "/api/v1/update/download";
    pub const VERSION_RESOLVE: &str = "/api/v1/version/resolve";
    pub const ACTIVATE: &str = "/api/v1/activate";
    pub const PLUGIN_CATALOG: &str = "/api/v1/plugins/catalog";
    pub const FEEDBACKS: &str = "/api/v1/feedbacks";
    pub const FEEDBACK_UPLOAD: &str = "/api/v1/feedbacks/upload";
    pub const RELEASE_NOTES: &str = "/api/v1/feedbacks/release-notes";
}

/// Heartbeat status telling the client to shut down for good.
pub const STATUS_KILL: &str = "kill";

/// Platform marker used for artifacts that run everywhere (frontend bundles).
pub const PLATFORM_UNIVERSAL: &str = "universal";

/// Error envelope returned alongside non-200 statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ── License verification ─────────────────────────────────────────

/// Body of `POST /api/v1/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub license_key: String,
    pub machine_id: String,
    pub aux_signals: BTreeMap<String, String>,
    pub project_slug: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    /// Random per-request value, so captured requests cannot be replayed.
    pub nonce: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Response of `POST /api/v1/verify`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub update_frozen: bool,
    /// Opaque authorization payload, signed by the authority.
    #[serde(default)]
    pub public_data: String,
    /// Base64 detached signature over `public_data`.
    #[serde(default)]
    pub signature: String,
}

impl VerifyResponse {
    /// Returns the symbolic error code, ignoring empty strings.
    pub fn error_code(&self) -> Option<&str> {
        non_empty(&self.error)
    }
}

// ── Heartbeat ────────────────────────────────────────────────────

/// One component's version as reported in a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub slug: String,
    pub version: String,
}

/// Body of `POST /api/v1/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub license_key: String,
    pub machine_id: String,
    pub project_slug: String,
    pub components: Vec<ComponentReport>,
}

/// Response of `POST /api/v1/heartbeat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default, rename = "next_interval_s")]
    pub next_interval_secs: u64,
    #[serde(default)]
    pub update_frozen: bool,
    #[serde(default)]
    pub updates: Vec<UpdateInfo>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HeartbeatResponse {
    /// Returns true if the authority ordered this machine shut down.
    pub fn is_kill(&self) -> bool {
        self.status == STATUS_KILL
    }
}

/// Update notification for one component, embedded in a heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub component: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub latest: String,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub release_notes: Option<String>,
}

// ── Update download ──────────────────────────────────────────────

/// Body of `POST /api/v1/update/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub license_key: String,
    pub machine_id: String,
    pub project_slug: String,
    pub component_slug: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

/// Response of `POST /api/v1/update/download`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Short-lived URL, absolute or relative to the server URL.
    #[serde(default)]
    pub download_url: String,
    /// Expected lowercase hex SHA-256 of the artifact.
    #[serde(default)]
    pub sha256: String,
    /// Base64 signature over the hex digest string.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DownloadResponse {
    /// Returns the symbolic error code, ignoring empty strings.
    pub fn error_code(&self) -> Option<&str> {
        non_empty(&self.error)
    }

    /// Returns the signature, ignoring empty strings.
    pub fn signature(&self) -> Option<&str> {
        non_empty(&self.signature)
    }
}

// ── Version resolution ───────────────────────────────────────────

/// Body of `POST /api/v1/version/resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveVersionRequest {
    pub license_key: String,
    pub machine_id: String,
    pub project_slug: String,
    pub component: String,
    pub binary_hash: String,
}

/// Response of `POST /api/v1/version/resolve`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveVersionResponse {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub build_time: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResolveVersionResponse {
    /// Returns the symbolic error code, ignoring empty strings.
    pub fn error_code(&self) -> Option<&str> {
        non_empty(&self.error)
    }
}

// ── Activation ───────────────────────────────────────────────────

/// Body of `POST /api/v1/activate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub code: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A license key issued in exchange for a one-time activation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResult {
    pub license_key: String,
    pub project_slug: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

// ── Plugin catalog ───────────────────────────────────────────────

/// One discoverable plugin and its update state on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ota_enabled: bool,
    #[serde(default)]
    pub installed_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub target_os: Option<String>,
    #[serde(default)]
    pub target_arch: Option<String>,
}

/// Response of `GET /api/v1/plugins/catalog`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCatalog {
    #[serde(default)]
    pub project_slug: String,
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub source_os: String,
    #[serde(default)]
    pub source_arch: String,
    #[serde(default)]
    pub update_frozen: bool,
    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

// ── Feedback ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    #[default]
    Bug,
    Suggestion,
    Question,
}

/// Where the vendor is with a feedback item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Processing,
    Resolved,
    Closed,
}

/// A previously uploaded file referenced from a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAttachment {
    pub kind: String,
    /// Key returned by the upload endpoint.
    pub file_key: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

/// What the end user wants to tell the vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub category: FeedbackCategory,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FeedbackAttachment>,
}

/// Body of `POST /api/v1/feedbacks`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitFeedbackRequest {
    pub license_key: String,
    pub machine_id: String,
    pub project_slug: String,
    #[serde(flatten)]
    pub feedback: FeedbackSubmission,
}

/// An attachment as stored by the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAttachmentInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub file_key: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

/// One feedback item with its replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: String,
    #[serde(default)]
    pub category: FeedbackCategory,
    #[serde(default)]
    pub status: FeedbackStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub attachments: Vec<FeedbackAttachmentInfo>,
    #[serde(default)]
    pub replies: Vec<FeedbackReply>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Response of `GET /api/v1/feedbacks`, one page at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPage {
    #[serde(default)]
    pub feedbacks: Vec<FeedbackItem>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

/// Response of `POST /api/v1/feedbacks/upload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub file_key: String,
}

// ── Release notes ────────────────────────────────────────────────

/// A feedback item closed by a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFeedback {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: FeedbackCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNoteEntry {
    pub version: String,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub resolved_feedbacks: Vec<ResolvedFeedback>,
    #[serde(default)]
    pub created_at: String,
}

/// Response of `GET /api/v1/feedbacks/release-notes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNotes {
    #[serde(default)]
    pub entries: Vec<ReleaseNoteEntry>,
}
