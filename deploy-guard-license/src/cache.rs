//! On-disk cache of the last trusted license assertion.
//!
//! One file per (project, component) under
//! `<root>/<project>/<component>/license.cache`. The cache is only ever an
//! optimization: anything unreadable, foreign, or unverifiable is treated
//! as a miss, never as an error.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deploy_guard_crypto::{decode_signature, TrustVerifier};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LicenseError, LicenseResult};

/// File name of the cache entry inside its component directory.
pub const CACHE_FILE_NAME: &str = "license.cache";

/// Directory under the home directory used when no root is configured.
pub const DEFAULT_CACHE_DIR: &str = ".deploy-guard";

/// A license assertion as last returned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLicense {
    /// Key the assertion was issued for.
    pub license_key: String,
    /// Opaque authorization payload.
    pub public_data: String,
    /// Base64 detached signature over `public_data`.
    pub signature: String,
    /// When the remote verification succeeded.
    pub verified_at: DateTime<Utc>,
}

impl CachedLicense {
    /// Returns true if the signature over `public_data` checks out.
    #[must_use]
    pub fn is_trusted(&self, trust: &dyn TrustVerifier) -> bool {
        decode_signature(&self.signature)
            .is_some_and(|sig| trust.verify(self.public_data.as_bytes(), &sig))
    }
}

/// Location of one component's cache entry.
#[derive(Debug, Clone)]
pub struct LicenseCache {
    dir: PathBuf,
}

impl LicenseCache {
    /// Cache for `project`/`component` under `root`.
    pub fn new(root: impl AsRef<Path>, project_slug: &str, component_slug: &str) -> Self {
        Self {
            dir: root.as_ref().join(project_slug).join(component_slug),
        }
    }

    /// Default root, `~/.deploy-guard`, falling back to the working directory
    /// when no home directory can be determined.
    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CACHE_DIR)
    }

    /// Directory holding the cache file.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the cache file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// Reads the entry without checking trust. Any failure is a miss.
    #[must_use]
    pub fn load(&self) -> Option<CachedLicense> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no license cache");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(cached) => Some(cached),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring corrupt license cache");
                None
            }
        }
    }

    /// Reads the entry and returns it only if it belongs to `license_key`
    /// and its signature verifies.
    #[must_use]
    pub fn load_trusted(
        &self,
        license_key: &str,
        trust: &dyn TrustVerifier,
    ) -> Option<CachedLicense> {
        let cached = self.load()?;
        if cached.license_key != license_key {
            debug!("license cache belongs to another key, ignoring");
            return None;
        }
        if !cached.is_trusted(trust) {
            debug!("license cache signature does not verify, ignoring");
            return None;
        }
        Some(cached)
    }

    /// Writes the entry, replacing any previous one.
    ///
    /// The directory is created owner-only and the file is swapped in with
    /// a rename so readers never see a partial write.
    pub fn store(&self, cached: &CachedLicense) -> LicenseResult<()> {
        create_private_dir(&self.dir)
            .map_err(|e| LicenseError::Storage(format!("create {}: {e}", self.dir.display())))?;

        let data = serde_json::to_vec(cached)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| LicenseError::Storage(format!("create temp file: {e}")))?;
        tmp.write_all(&data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| LicenseError::Storage(format!("write cache: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(|e| LicenseError::Storage(format!("chmod cache: {e}")))?;
        }

        tmp.persist(self.path())
            .map_err(|e| LicenseError::Storage(format!("persist cache: {}", e.error)))?;
        Ok(())
    }

    /// Deletes the entry if present.
    pub fn clear(&self) -> LicenseResult<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LicenseError::Storage(format!("remove cache: {e}"))),
        }
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }

    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}
