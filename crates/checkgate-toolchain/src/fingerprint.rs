//! Cache key derivation from environment state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic cache key: SHA-256 over a salt (typically the toolchain
/// channel) and the contents of the job's key files (manifest/lock
/// state). Same inputs always yield the same key.
///
/// A missing key file contributes an absence marker rather than failing,
/// so the key changes when the file appears but derivation stays total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a salt and set of key files, resolved
    /// relative to `base`.
    ///
    /// File order is significant; callers pass the declared order so the
    /// key is stable across runs of the same definition.
    pub fn compute(
        salt: &str,
        base: &Path,
        key_files: &[PathBuf],
    ) -> Result<Self, std::io::Error> {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"\0");
        for file in key_files {
            hasher.update(file.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            let path = base.join(file);
            match std::fs::read(&path) {
                Ok(content) => hasher.update(&content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    hasher.update(b"<absent>");
                }
                Err(e) => return Err(e),
            }
            hasher.update(b"\0");
        }
        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
