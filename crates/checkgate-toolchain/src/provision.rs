//! Toolchain provisioning behind a capability trait.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use checkgate_core::step::ToolchainSpec;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ProvisionError;

/// A provisioned toolchain, ready to be exposed to job steps.
///
/// Tool resolution is environment-based: the entries returned by
/// [`Toolchain::env`] (e.g. `RUSTUP_TOOLCHAIN`) make the hosting shims
/// resolve the right binaries, so steps need no PATH surgery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Channel that was provisioned (e.g. "stable").
    pub channel: String,

    /// Components present in the toolchain.
    pub components: Vec<String>,

    env: Vec<(String, String)>,
}

impl Toolchain {
    /// Build a toolchain handle with the environment steps run under.
    pub fn new(channel: impl Into<String>, components: Vec<String>, env: Vec<(String, String)>) -> Self {
        Self {
            channel: channel.into(),
            components,
            env,
        }
    }

    /// Environment entries every step of the job runs with.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

/// Toolchain acquisition capability.
///
/// Guarantees:
/// - Idempotent: provisioning the same spec twice in the same environment
///   yields an equivalent toolchain without re-downloading.
/// - Any `Err` is fatal to the requesting job; no later step runs.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a toolchain for the given spec.
    async fn provision(&self, spec: &ToolchainSpec) -> Result<Toolchain, ProvisionError>;
}

/// Rustup-backed provisioner.
///
/// Checks the installed-toolchain list before installing, so repeated
/// provisioning of an already-present channel only re-verifies
/// components (which rustup itself treats as a no-op).
pub struct RustupProvisioner {
    rustup: PathBuf,
}

impl RustupProvisioner {
    /// Use `rustup` from PATH.
    pub fn new() -> Self {
        Self {
            rustup: PathBuf::from("rustup"),
        }
    }

    /// Use a specific rustup binary.
    pub fn with_binary(rustup: impl Into<PathBuf>) -> Self {
        Self {
            rustup: rustup.into(),
        }
    }

    async fn run_rustup(&self, args: &[String]) -> Result<std::process::Output, ProvisionError> {
        Command::new(&self.rustup)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProvisionError::ToolNotFound(self.rustup.display().to_string())
                } else {
                    ProvisionError::Io(e)
                }
            })
    }

    async fn is_installed(&self, channel: &str) -> Result<bool, ProvisionError> {
        let output = self
            .run_rustup(&["toolchain".to_string(), "list".to_string()])
            .await?;
        if !output.status.success() {
            return Err(ProvisionError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(listing
            .lines()
            .any(|line| line.trim().starts_with(channel)))
    }
}

impl Default for RustupProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provisioner for RustupProvisioner {
    async fn provision(&self, spec: &ToolchainSpec) -> Result<Toolchain, ProvisionError> {
        if self.is_installed(&spec.channel).await? {
            debug!(channel = %spec.channel, "Toolchain already installed");
            if !spec.components.is_empty() {
                let output = self.run_rustup(&component_args(spec)).await?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    return Err(classify_failure(&stderr, spec));
                }
            }
        } else {
            info!(channel = %spec.channel, "Installing toolchain");
            let output = self.run_rustup(&install_args(spec)).await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                return Err(classify_failure(&stderr, spec));
            }
        }

        Ok(Toolchain::new(
            spec.channel.clone(),
            spec.components.clone(),
            vec![("RUSTUP_TOOLCHAIN".to_string(), spec.channel.clone())],
        ))
    }
}

/// Arguments for a fresh channel install.
fn install_args(spec: &ToolchainSpec) -> Vec<String> {
    let mut args = vec![
        "toolchain".to_string(),
        "install".to_string(),
        spec.channel.clone(),
        "--profile".to_string(),
        "minimal".to_string(),
    ];
    for component in &spec.components {
        args.push("--component".to_string());
        args.push(component.clone());
    }
    args
}

/// Arguments for adding components to an installed channel.
fn component_args(spec: &ToolchainSpec) -> Vec<String> {
    let mut args = vec![
        "component".to_string(),
        "add".to_string(),
        "--toolchain".to_string(),
        spec.channel.clone(),
    ];
    args.extend(spec.components.iter().cloned());
    args
}

/// Map rustup stderr onto the provisioning error taxonomy.
fn classify_failure(stderr: &str, spec: &ToolchainSpec) -> ProvisionError {
    let lower = stderr.to_lowercase();
    if lower.contains("invalid toolchain name") || lower.contains("no release found") {
        return ProvisionError::UnknownChannel(spec.channel.clone());
    }
    if lower.contains("unknown component") || lower.contains("does not contain component") {
        let component = spec
            .components
            .iter()
            .find(|c| lower.contains(&c.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| "<unknown>".to_string());
        return ProvisionError::UnknownComponent(component);
    }
    ProvisionError::CommandFailed(stderr.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ToolchainSpec {
        ToolchainSpec::new("stable").with_components(["rustfmt", "clippy"])
    }

    #[test]
    fn test_install_args_include_components() {
        let args = install_args(&spec());
        assert_eq!(args[0], "toolchain");
        assert_eq!(args[1], "install");
        assert_eq!(args[2], "stable");
        assert_eq!(
            args.iter().filter(|a| a.as_str() == "--component").count(),
            2
        );
        assert!(args.contains(&"rustfmt".to_string()));
    }

    #[test]
    fn test_component_args_target_channel() {
        let args = component_args(&spec());
        assert_eq!(args[..4], ["component", "add", "--toolchain", "stable"]);
        assert_eq!(args[4..], ["rustfmt", "clippy"]);
    }

    #[test]
    fn test_classify_unknown_channel() {
        let err = classify_failure("error: invalid toolchain name: 'stale'", &spec());
        assert!(matches!(err, ProvisionError::UnknownChannel(c) if c == "stable"));
    }

    #[test]
    fn test_classify_unknown_component() {
        let err = classify_failure(
            "error: toolchain 'stable' does not contain component 'clippy'",
            &spec(),
        );
        assert!(matches!(err, ProvisionError::UnknownComponent(c) if c == "clippy"));
    }

    #[test]
    fn test_classify_other_failure() {
        let err = classify_failure("error: could not download file", &spec());
        assert!(matches!(err, ProvisionError::CommandFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let provisioner =
            RustupProvisioner::with_binary("/nonexistent-rustup-binary-for-tests");
        let err = provisioner.provision(&spec()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ToolNotFound(_)));
    }
}
