//! In-memory fakes for the capability traits (testing only)
//!
//! Provides `FakeProvisioner`, `MemoryCacheStore`, and `FailingCacheStore`
//! that satisfy the trait contracts without network or toolchain access.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use checkgate_core::step::ToolchainSpec;

use crate::cache::{CacheResult, CacheStore};
use crate::error::{CacheError, ProvisionError};
use crate::fingerprint::Fingerprint;
use crate::provision::{Provisioner, Toolchain};

// ---------------------------------------------------------------------------
// FakeProvisioner
// ---------------------------------------------------------------------------

/// Provisioner fake that records calls and can be scripted to fail.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    env: Vec<(String, String)>,
    failure: Option<String>,
    calls: Mutex<Vec<ToolchainSpec>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake whose provisioned toolchains expose the given environment.
    pub fn with_env(env: Vec<(String, String)>) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    /// Fake that fails every provision call with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of provision calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Specs passed to provision, in call order.
    pub fn calls(&self) -> Vec<ToolchainSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, spec: &ToolchainSpec) -> Result<Toolchain, ProvisionError> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(message) = &self.failure {
            return Err(ProvisionError::CommandFailed(message.clone()));
        }
        Ok(Toolchain::new(
            spec.channel.clone(),
            spec.components.clone(),
            self.env.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// MemoryCacheStore
// ---------------------------------------------------------------------------

/// In-memory cache backed by a `HashMap<key, payload>`.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.lock().unwrap().contains_key(key.as_str())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn restore(&self, key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn save(&self, key: &Fingerprint, payload: &[u8]) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.as_str().to_string(), payload.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingCacheStore
// ---------------------------------------------------------------------------

/// Cache fake whose every operation fails, for exercising the
/// best-effort degradation paths.
#[derive(Debug, Default)]
pub struct FailingCacheStore;

impl FailingCacheStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn restore(&self, _key: &Fingerprint) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Unavailable("restore always fails".to_string()))
    }

    async fn save(&self, _key: &Fingerprint, _payload: &[u8]) -> CacheResult<()> {
        Err(CacheError::Unavailable("save always fails".to_string()))
    }
}
