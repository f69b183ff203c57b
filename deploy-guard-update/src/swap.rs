//! Two-phase filesystem swaps with a kept backup.
//!
//! Both strategies move through the same phases:
//!
//! ```text
//! Staged -> BackedUp -> Swapped -> Committed
//! ```
//!
//! The second rename is the point of no return. A failure before it is
//! recovered from the backup; a failure of that recovery is reported as
//! [`UpdateError::Rollback`].

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{UpdateError, UpdateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapPhase {
    Staged,
    BackedUp,
    Swapped,
    Committed,
}

/// `<target>.bak`
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Replaces the binary at `target` with `staged`.
///
/// The old binary is linked (or copied) to `<target>.bak` first, then the
/// staged file is renamed over the target, so the target path always holds
/// a complete binary. The backup is kept after success.
pub(crate) fn replace_binary(staged: TempPath, target: &Path) -> UpdateResult<()> {
    make_executable(&staged)
        .map_err(|e| UpdateError::Apply(format!("chmod {}: {e}", staged.display())))?;

    let backup = backup_path(target);
    let mut phase = SwapPhase::Staged;

    if target.exists() {
        remove_path(&backup)
            .map_err(|e| UpdateError::Apply(format!("remove stale {}: {e}", backup.display())))?;
        fs::hard_link(target, &backup)
            .or_else(|_| fs::copy(target, &backup).map(|_| ()))
            .map_err(|e| UpdateError::Apply(format!("back up {}: {e}", target.display())))?;
        phase = SwapPhase::BackedUp;
    }
    debug!(?phase, target = %target.display(), "binary staged");

    if let Err(e) = staged.persist(target) {
        let apply = format!("install {}: {}", target.display(), e.error);
        return Err(restore_binary(phase, &backup, target, apply));
    }
    phase = SwapPhase::Swapped;
    debug!(?phase, target = %target.display(), "binary swapped");

    phase = SwapPhase::Committed;
    debug!(?phase, backup = %backup.display(), "binary committed");
    Ok(())
}

/// The rename over the target is atomic, so a failed install normally
/// leaves the old binary in place. Only a missing target is restored.
fn restore_binary(phase: SwapPhase, backup: &Path, target: &Path, apply: String) -> UpdateError {
    if phase != SwapPhase::BackedUp || target.exists() {
        return UpdateError::Apply(apply);
    }
    match fs::rename(backup, target) {
        Ok(()) => {
            warn!(target = %target.display(), "restored previous binary");
            UpdateError::Apply(apply)
        }
        Err(e) => UpdateError::Rollback {
            apply,
            rollback: format!("restore {}: {e}", target.display()),
        },
    }
}

/// Moves the `staged` directory into `live`, keeping the old one as
/// `<live>.bak` and putting it back if the final rename fails.
pub(crate) fn swap_directory(staged: &Path, live: &Path) -> UpdateResult<()> {
    make_browsable(staged)
        .map_err(|e| UpdateError::Apply(format!("chmod {}: {e}", staged.display())))?;

    let backup = backup_path(live);
    let mut phase = SwapPhase::Staged;

    remove_path(&backup)
        .map_err(|e| UpdateError::Apply(format!("remove stale {}: {e}", backup.display())))?;
    if live.exists() {
        fs::rename(live, &backup)
            .map_err(|e| UpdateError::Apply(format!("back up {}: {e}", live.display())))?;
        phase = SwapPhase::BackedUp;
    }
    debug!(?phase, live = %live.display(), "directory staged");

    if let Err(e) = fs::rename(staged, live) {
        let apply = format!("install {}: {e}", live.display());
        if phase != SwapPhase::BackedUp {
            return Err(UpdateError::Apply(apply));
        }
        return Err(match fs::rename(&backup, live) {
            Ok(()) => {
                warn!(live = %live.display(), "restored previous directory");
                UpdateError::Apply(apply)
            }
            Err(r) => UpdateError::Rollback {
                apply,
                rollback: format!("restore {}: {r}", live.display()),
            },
        });
    }
    phase = SwapPhase::Swapped;
    debug!(?phase, live = %live.display(), "directory swapped");

    phase = SwapPhase::Committed;
    debug!(?phase, backup = %backup.display(), "directory committed");
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(unix)]
fn make_browsable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn make_browsable(_path: &Path) -> io::Result<()> {
    Ok(())
}
