//! Best-effort artifact cache keyed by environment fingerprint.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache capability.
///
/// Guarantees:
/// - `restore` miss is `Ok(None)`, never an error.
/// - Reads are non-exclusive; concurrent writers to one key may race and
///   either write may win. Payloads are opaque to the store.
/// - Callers treat any `Err` as a cold run (restore) or a dropped write
///   (save); cache outcomes never decide job status.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a payload by key.
    async fn restore(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>>;

    /// Persist a payload under a key, replacing any previous entry.
    async fn save(&self, key: &Fingerprint, payload: &[u8]) -> CacheResult<()>;
}

/// Filesystem-backed cache: one file per fingerprint under a root
/// directory.
///
/// Writes go through a temp file in the same directory followed by an
/// atomic rename, so a racing reader never observes a torn payload.
pub struct DirCacheStore {
    root: PathBuf,
}

impl DirCacheStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl CacheStore for DirCacheStore {
    async fn restore(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(payload) => {
                debug!(key = %key.short(), bytes = payload.len(), "Cache hit");
                Ok(Some(payload))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = %key.short(), "Cache miss");
                Ok(None)
            }
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    async fn save(&self, key: &Fingerprint, payload: &[u8]) -> CacheResult<()> {
        let root = self.root.clone();
        let path = self.entry_path(key);
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || -> CacheResult<()> {
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&payload)?;
            tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Unavailable(e.to_string()))?
    }
}
