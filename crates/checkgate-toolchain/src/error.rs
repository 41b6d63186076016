//! Error types for checkgate-toolchain.

use thiserror::Error;

/// Errors raised while provisioning a toolchain.
///
/// Any of these is fatal to the job that requested the toolchain: no
/// step after the provisioning step runs.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The requested channel name is not known to the toolchain manager.
    #[error("unknown toolchain channel '{0}'")]
    UnknownChannel(String),

    /// A requested component is not available for the channel.
    #[error("unknown toolchain component '{0}'")]
    UnknownComponent(String),

    /// The toolchain manager binary is not installed or not on PATH.
    #[error("toolchain tool not found: {0}")]
    ToolNotFound(String),

    /// The toolchain manager ran but failed (network failure, etc.).
    #[error("toolchain command failed: {0}")]
    CommandFailed(String),

    /// IO error while invoking the toolchain manager.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by cache backends.
///
/// Callers treat any of these as a miss (on restore) or a dropped write
/// (on save); cache outcomes never decide job status.
#[derive(Error, Debug)]
pub enum CacheError {
    /// IO error while reading or writing an entry.
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot be reached (quota, network, ...).
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}
