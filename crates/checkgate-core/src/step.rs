//! Step definitions and builtin check presets.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Toolchain requested by a job (named channel plus optional components).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolchainSpec {
    /// Named channel, e.g. "stable" or "1.78.0".
    pub channel: String,

    /// Optional add-on components, e.g. "rustfmt", "clippy".
    #[serde(default)]
    pub components: Vec<String>,
}

impl ToolchainSpec {
    /// Spec for a bare channel.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            components: Vec::new(),
        }
    }

    /// Add components to the spec.
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }
}

/// Cache configuration for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSpec {
    /// Path (relative to the job working directory) whose contents are
    /// persisted between runs as an opaque payload.
    pub path: PathBuf,

    /// Manifest/lock files hashed into the cache key.
    pub key_files: Vec<PathBuf>,
}

/// What a step does.
///
/// Declarative step configuration maps onto a tagged variant evaluated
/// by the step interpreter; provisioning and caching stay behind
/// swappable capability traits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "uses", rename_all = "snake_case")]
pub enum StepAction {
    /// Execute a command (first element is the executable).
    Run { command: Vec<String> },

    /// Provision the job toolchain. Failure is fatal to the job: no
    /// later step runs.
    InstallToolchain { toolchain: ToolchainSpec },

    /// Restore the job cache now and save it back at job end. Both
    /// directions are best-effort and never fail the job.
    Cache { cache: CacheSpec },
}

/// One step of a job, executed in declared order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSpec {
    /// Human-readable step name.
    pub name: String,

    /// What the step does.
    pub action: StepAction,

    /// Treat a failure of this step as non-fatal and advance.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Extra environment entries for this step only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StepSpec {
    /// Command step.
    pub fn run(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Run { command },
            continue_on_error: false,
            env: BTreeMap::new(),
        }
    }

    /// Toolchain provisioning step.
    pub fn install_toolchain(name: impl Into<String>, toolchain: ToolchainSpec) -> Self {
        Self {
            name: name.into(),
            action: StepAction::InstallToolchain { toolchain },
            continue_on_error: false,
            env: BTreeMap::new(),
        }
    }

    /// Cache restore/save step.
    pub fn cache(name: impl Into<String>, cache: CacheSpec) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Cache { cache },
            continue_on_error: false,
            env: BTreeMap::new(),
        }
    }

    /// Mark this step's failures as non-fatal.
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Add an environment entry for this step.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Builtin quality checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// cargo fmt --all -- --check
    Fmt,

    /// cargo clippy --workspace --all-targets -- -D warnings
    Clippy,

    /// cargo deny check
    Deny,
}

impl BuiltinCheck {
    /// Get the check name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::Fmt => "fmt",
            BuiltinCheck::Clippy => "clippy",
            BuiltinCheck::Deny => "deny",
        }
    }

    /// Get the check's command.
    pub fn command(&self) -> Vec<String> {
        let parts: &[&str] = match self {
            BuiltinCheck::Fmt => &["cargo", "fmt", "--all", "--", "--check"],
            BuiltinCheck::Clippy => &[
                "cargo",
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ],
            BuiltinCheck::Deny => &["cargo", "deny", "check"],
        };
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// Toolchain components the check needs, if any.
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            BuiltinCheck::Fmt => &["rustfmt"],
            BuiltinCheck::Clippy => &["clippy"],
            BuiltinCheck::Deny => &[],
        }
    }

    /// Expand into a step.
    pub fn to_step(self) -> StepSpec {
        StepSpec::run(self.name(), self.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_check_names() {
        assert_eq!(BuiltinCheck::Fmt.name(), "fmt");
        assert_eq!(BuiltinCheck::Clippy.name(), "clippy");
        assert_eq!(BuiltinCheck::Deny.name(), "deny");
    }

    #[test]
    fn test_builtin_check_commands() {
        let fmt = BuiltinCheck::Fmt.command();
        assert_eq!(fmt[0], "cargo");
        assert!(fmt.contains(&"--check".to_string()));

        let clippy = BuiltinCheck::Clippy.command();
        assert!(clippy.contains(&"warnings".to_string()));

        let deny = BuiltinCheck::Deny.command();
        assert_eq!(deny, vec!["cargo", "deny", "check"]);
    }

    #[test]
    fn test_builtin_check_components() {
        assert_eq!(BuiltinCheck::Fmt.components(), &["rustfmt"]);
        assert_eq!(BuiltinCheck::Clippy.components(), &["clippy"]);
        assert!(BuiltinCheck::Deny.components().is_empty());
    }

    #[test]
    fn test_builtin_check_to_step() {
        let step = BuiltinCheck::Fmt.to_step();
        assert_eq!(step.name, "fmt");
        assert!(!step.continue_on_error);
        match step.action {
            StepAction::Run { command } => assert_eq!(command[1], "fmt"),
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn test_step_builders() {
        let step = StepSpec::run("echo", vec!["echo".to_string(), "hi".to_string()])
            .continue_on_error()
            .with_env("RUST_LOG", "debug");
        assert!(step.continue_on_error);
        assert_eq!(step.env.get("RUST_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_toolchain_spec_with_components() {
        let spec = ToolchainSpec::new("stable").with_components(["rustfmt", "clippy"]);
        assert_eq!(spec.channel, "stable");
        assert_eq!(spec.components.len(), 2);
    }
}
