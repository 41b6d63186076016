//! checkgate-toolchain - environment capabilities for gate jobs
//!
//! Provides the two swappable capabilities the step interpreter composes
//! with verification steps:
//! - `Provisioner`: acquire a named toolchain (idempotent, fatal on failure)
//! - `CacheStore`: best-effort artifact cache keyed by environment fingerprint

pub mod cache;
pub mod error;
pub mod fakes;
pub mod fingerprint;
pub mod provision;

// Re-export key types
pub use cache::{CacheResult, CacheStore, DirCacheStore};
pub use error::{CacheError, ProvisionError};
pub use fingerprint::Fingerprint;
pub use provision::{Provisioner, RustupProvisioner, Toolchain};
