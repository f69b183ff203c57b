//! SHA-256 helpers for artifacts and binaries.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Returns the lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn sha256_file(path: &Path) -> CryptoResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Incremental SHA-256 over a download, bounded by a byte ceiling.
///
/// Chunks that would push the total past the ceiling are refused whole, so
/// the digest never covers a truncated prefix of an oversized artifact.
#[derive(Debug, Clone)]
pub struct StreamDigest {
    hasher: Sha256,
    len: u64,
    limit: u64,
}

impl StreamDigest {
    /// Creates a digest that accepts at most `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: u64) -> Self {
        Self {
            hasher: Sha256::new(),
            len: 0,
            limit,
        }
    }

    /// Feeds the next chunk.
    pub fn update(&mut self, chunk: &[u8]) -> CryptoResult<()> {
        let next = self.len.saturating_add(chunk.len() as u64);
        if next > self.limit {
            return Err(CryptoError::SizeLimitExceeded { limit: self.limit });
        }
        self.hasher.update(chunk);
        self.len = next;
        Ok(())
    }

    /// Bytes accepted so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if nothing has been hashed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the digest and returns the lowercase hex SHA-256.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
