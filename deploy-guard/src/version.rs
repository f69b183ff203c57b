//! Version discovery from the running executable's hash.

use std::sync::{Mutex, PoisonError};

use deploy_guard_api::{endpoints, ResolveVersionRequest, ResolveVersionResponse};
use deploy_guard_crypto::sha256_file;
use deploy_guard_license::LicenseError;
use tracing::info;

use crate::error::{GuardError, GuardResult};
use crate::guard::Guard;

static BINARY_HASH: Mutex<Option<String>> = Mutex::new(None);

/// SHA-256 of the running executable, lowercase hex.
///
/// Computed once per process; failures are not cached.
pub fn binary_hash() -> GuardResult<String> {
    let mut cached = BINARY_HASH.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(hash) = cached.as_ref() {
        return Ok(hash.clone());
    }
    let exe = std::env::current_exe()?;
    let hash = sha256_file(&exe).map_err(|e| {
        GuardError::Io(std::io::Error::other(format!(
            "hash {}: {e}",
            exe.display()
        )))
    })?;
    *cached = Some(hash.clone());
    Ok(hash)
}

/// Forgets the cached executable hash, e.g. after the binary was replaced.
pub fn reset_binary_hash_cache() {
    *BINARY_HASH.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

impl Guard {
    /// Asks the authority which release the running executable is, and
    /// makes that the reported version.
    pub async fn auto_resolve_version(&self) -> GuardResult<String> {
        self.scoped(self.resolve_version_inner()).await
    }

    async fn resolve_version_inner(&self) -> GuardResult<String> {
        let binary_hash = tokio::task::spawn_blocking(binary_hash)
            .await
            .map_err(|e| GuardError::Io(std::io::Error::other(e)))??;

        let request = ResolveVersionRequest {
            license_key: self.config.license_key.clone(),
            machine_id: self.identity.machine_id().to_string(),
            project_slug: self.config.project_slug.clone(),
            component: self.config.component_slug.clone(),
            binary_hash,
        };
        let response: ResolveVersionResponse = self
            .client
            .post_json(endpoints::VERSION_RESOLVE, &request)
            .await?;
        if let Some(code) = response.error_code() {
            return Err(LicenseError::from_code(code).into());
        }
        if response.version.is_empty() {
            return Err(GuardError::InvalidServerResponse(
                "resolved version is empty".to_string(),
            ));
        }

        self.versions.set_primary(response.version.clone());
        info!(
            version = %response.version,
            git_commit = response.git_commit.as_deref().unwrap_or_default(),
            build_time = response.build_time.as_deref().unwrap_or_default(),
            "version resolved"
        );
        Ok(response.version)
    }
}
