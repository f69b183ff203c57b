//! Embeddable license guard with heartbeat and signed over-the-air updates.
//!
//! A [`Guard`] verifies the host's license (offline from a signed cache
//! when possible), then keeps a background heartbeat running against the
//! authority. Heartbeat outcomes drive a small state machine:
//!
//! ```text
//! INIT --verify--> ACTIVE --heartbeat fails--> GRACE --offline too long--> LOCKED
//!                    ^                           |
//!                    +------heartbeat ok---------+
//! any state --kill--> BANNED
//! ```
//!
//! Update notifications carried by heartbeats are handed to the update
//! engine, which downloads, verifies and installs artifacts for the host
//! binary and for any managed components. The same connection also
//! carries end-user feedback and release notes.

mod config;
mod error;
mod feedback;
mod guard;
mod heartbeat;
mod plugins;
mod state;
mod version;

pub use config::{GracePolicy, GuardConfig};
pub use error::{GuardError, GuardResult};
pub use guard::{Guard, GuardBuilder};
pub use state::{GuardState, StateMachine};
pub use version::{binary_hash, reset_binary_hash_cache};

pub use deploy_guard_api::{
    ActivationResult, FeedbackAttachment, FeedbackAttachmentInfo, FeedbackCategory, FeedbackItem,
    FeedbackPage, FeedbackReply, FeedbackStatus, FeedbackSubmission, PluginCatalog, PluginInfo,
    ReleaseNoteEntry, ReleaseNotes, ResolvedFeedback, UpdateInfo, UploadedFile,
};
pub use deploy_guard_license::{
    activate, DeviceFingerprint, IdentityProvider, LicenseCache, LicenseError,
};
pub use deploy_guard_update::{
    ManagedComponent, OtaConfig, UpdateCallbacks, UpdateError, UpdateReport, UpdateStage,
    UpdateStrategy, UNKNOWN_VERSION,
};
