//! Guard configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use deploy_guard_api::AuthorityClient;
use deploy_guard_crypto::Ed25519Verifier;
use deploy_guard_update::{ManagedComponent, OtaConfig};

use crate::error::{GuardError, GuardResult};

/// How long the guard tolerates an unreachable authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GracePolicy {
    /// Time since the first failed heartbeat after which the guard locks.
    pub max_offline_duration: Duration,
    /// Minimum spacing of the "running offline" warnings.
    pub warning_interval: Duration,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            max_offline_duration: Duration::from_secs(72 * 60 * 60),
            warning_interval: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Everything a [`crate::Guard`] needs to run.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Authority base URL, `http://` or `https://`.
    pub server_url: String,
    pub license_key: String,
    /// PEM `PUBLIC KEY` block holding the authority's Ed25519 key.
    pub public_key_pem: String,
    pub project_slug: String,
    /// Slug of the host process itself.
    pub component_slug: String,
    pub heartbeat_interval: Duration,
    /// Timeout for JSON requests. Artifact downloads use
    /// `ota.download_timeout` instead.
    pub request_timeout: Duration,
    pub grace: GracePolicy,
    pub ota: OtaConfig,
    pub managed_components: Vec<ManagedComponent>,
    /// Root of the license cache. Defaults to `~/.deploy-guard`.
    pub cache_root: Option<PathBuf>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            license_key: String::new(),
            public_key_pem: String::new(),
            project_slug: String::new(),
            component_slug: String::new(),
            heartbeat_interval: Duration::from_secs(60 * 60),
            request_timeout: AuthorityClient::DEFAULT_REQUEST_TIMEOUT,
            grace: GracePolicy::default(),
            ota: OtaConfig::default(),
            managed_components: Vec::new(),
            cache_root: None,
        }
    }
}

impl GuardConfig {
    /// Longest accepted heartbeat interval.
    pub const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Checks required fields and parses the public key.
    pub fn validate(&self) -> GuardResult<()> {
        self.trust_verifier().map(|_| ())
    }

    /// Validates the configuration and returns the parsed authority key.
    pub fn trust_verifier(&self) -> GuardResult<Ed25519Verifier> {
        for (name, value) in [
            ("server_url", &self.server_url),
            ("license_key", &self.license_key),
            ("public_key_pem", &self.public_key_pem),
            ("project_slug", &self.project_slug),
            ("component_slug", &self.component_slug),
        ] {
            if value.trim().is_empty() {
                return Err(GuardError::Config(format!("{name} is required")));
            }
        }
        if self.heartbeat_interval.is_zero() {
            return Err(GuardError::Config(
                "heartbeat_interval must be positive".to_string(),
            ));
        }
        if self.heartbeat_interval > Self::MAX_HEARTBEAT_INTERVAL {
            return Err(GuardError::Config(format!(
                "heartbeat_interval must not exceed {:?}",
                Self::MAX_HEARTBEAT_INTERVAL
            )));
        }

        let mut seen = HashSet::from([self.component_slug.as_str()]);
        for component in &self.managed_components {
            if component.slug.is_empty() {
                return Err(GuardError::Config(
                    "managed component slug is required".to_string(),
                ));
            }
            if !seen.insert(component.slug.as_str()) {
                return Err(GuardError::Config(format!(
                    "duplicate component slug: {}",
                    component.slug
                )));
            }
        }

        Ed25519Verifier::from_pem(&self.public_key_pem)
            .map_err(|e| GuardError::Config(format!("public_key_pem: {e}")))
    }
}
