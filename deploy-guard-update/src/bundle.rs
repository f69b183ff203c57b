//! Extraction of tar.gz directory bundles.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use bytes::{Buf, Bytes};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{UpdateError, UpdateResult};

/// Blocking reader over chunks produced by the async download.
pub(crate) struct ChannelReader {
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl ChannelReader {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.blocking_recv() {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Extracts a gzip-compressed tar stream into `root`.
///
/// Only regular files and directories are written. Links and special
/// entries are skipped. An absolute path or a `..` component fails the
/// whole extraction before that entry touches the disk.
pub(crate) fn extract_bundle<R: Read>(reader: R, root: &Path) -> UpdateResult<usize> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut written = 0;

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let raw = entry.path().map_err(malformed)?.into_owned();
        let Some(relative) = contained_path(&raw) else {
            warn!(path = %raw.display(), "bundle entry escapes the extraction root");
            return Err(UpdateError::Verify(format!(
                "unsafe path in bundle: {}",
                raw.display()
            )));
        };
        let dest = root.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&dest).map_err(|e| write_failed(&dest, e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if relative.as_os_str().is_empty() {
                    return Err(UpdateError::Verify(format!(
                        "file entry without a name: {}",
                        raw.display()
                    )));
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| write_failed(parent, e))?;
                }
                let mode = entry.header().mode().ok();
                let mut file = fs::File::create(&dest).map_err(|e| write_failed(&dest, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => malformed(e),
                    _ => write_failed(&dest, e),
                })?;
                set_mode(&dest, mode).map_err(|e| write_failed(&dest, e))?;
                written += 1;
            }
            other => {
                warn!(path = %raw.display(), kind = ?other, "skipping non-regular bundle entry");
            }
        }
    }

    debug!(files = written, root = %root.display(), "bundle extracted");
    Ok(written)
}

/// `path` with `.` components dropped, or `None` if it could leave the root.
fn contained_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode.map(|m| m & 0o777).filter(|m| *m != 0) {
        Some(m) => fs::set_permissions(path, fs::Permissions::from_mode(m | 0o600)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

fn malformed(err: io::Error) -> UpdateError {
    UpdateError::Verify(format!("malformed bundle: {err}"))
}

fn write_failed(path: &Path, err: io::Error) -> UpdateError {
    UpdateError::Apply(format!("write {}: {err}", path.display()))
}
