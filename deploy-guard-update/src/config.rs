//! OTA configuration and managed component descriptions.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Hook run after a component was swapped in successfully.
pub type PostUpdateHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Over-the-air update settings.
#[derive(Debug, Clone)]
pub struct OtaConfig {
    /// Act on update notifications at all.
    pub enabled: bool,
    /// Apply notified updates without asking. When false, notifications
    /// only reach the `on_available` callback.
    pub auto_update: bool,
    /// Platform name sent for binary artifacts.
    pub os: String,
    /// Architecture name sent for binary artifacts.
    pub arch: String,
    /// Downloads larger than this are aborted.
    pub max_artifact_bytes: u64,
    /// Upper bound for one whole download.
    pub download_timeout: Duration,
    /// Reject directory bundles the server did not sign.
    pub require_bundle_signature: bool,
    /// Binary replaced when the primary component updates. Defaults to the
    /// running executable.
    pub primary_target: Option<PathBuf>,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_update: true,
            os: default_os(),
            arch: default_arch(),
            max_artifact_bytes: 512 * 1024 * 1024,
            download_timeout: Duration::from_secs(10 * 60),
            require_bundle_signature: true,
            primary_target: None,
        }
    }
}

/// How a component's artifact is put in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
    /// A single executable replaced through a rename, keeping `<target>.bak`.
    BinaryReplace,
    /// A tar.gz bundle extracted next to the live directory and swapped in.
    #[default]
    DirectorySwap,
}

/// A secondary artifact the guard keeps up to date.
#[derive(Clone)]
pub struct ManagedComponent {
    pub slug: String,
    /// Binary path or live directory, depending on `strategy`.
    pub target: PathBuf,
    pub strategy: UpdateStrategy,
    pub post_update: Option<PostUpdateHook>,
}

impl ManagedComponent {
    /// A directory bundle (e.g. a web frontend).
    pub fn directory(slug: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            slug: slug.into(),
            target: dir.into(),
            strategy: UpdateStrategy::DirectorySwap,
            post_update: None,
        }
    }

    /// A standalone binary.
    pub fn binary(slug: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            slug: slug.into(),
            target: path.into(),
            strategy: UpdateStrategy::BinaryReplace,
            post_update: None,
        }
    }

    /// Runs `hook` after each successful update of this component.
    /// A failing hook is logged; the update stays applied.
    pub fn with_post_update<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_update = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ManagedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedComponent")
            .field("slug", &self.slug)
            .field("target", &self.target)
            .field("strategy", &self.strategy)
            .field("post_update", &self.post_update.is_some())
            .finish()
    }
}

/// Authority's name for the host OS.
fn default_os() -> String {
    match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

/// Authority's name for the host architecture.
fn default_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "386".to_string(),
        other => other.to_string(),
    }
}
