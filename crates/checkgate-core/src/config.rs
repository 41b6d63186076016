//! Workflow definition: TOML surface and validated model.
//!
//! The human-authored surface mirrors the hosting platform's declarative
//! run definition:
//!
//! ```toml
//! name = "quality"
//!
//! [triggers.push]
//! branches = ["main"]
//! paths = ["**.rs", "Cargo.toml", "Cargo.lock"]
//!
//! [strategy]
//! fail-fast = false
//!
//! [[jobs]]
//! name = "lint"
//! timeout-minutes = 30
//!
//! [[jobs.steps]]
//! name = "toolchain"
//! uses = "toolchain"
//! channel = "stable"
//! components = ["rustfmt", "clippy"]
//!
//! [[jobs.steps]]
//! uses = "cache"
//! path = "target"
//! key-files = ["Cargo.toml", "Cargo.lock"]
//!
//! [[jobs.steps]]
//! name = "fmt"
//! run = "cargo fmt --all -- --check"
//! ```
//!
//! `run` strings are split on whitespace — no shell quoting. A step that
//! needs shell semantics uses the list form:
//! `command = ["sh", "-c", "..."]`.
//!
//! Raw serde structs are mapped into the typed model with validation, so
//! the engine only ever sees well-formed workflows.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, TriggerError};
use crate::event::EventKind;
use crate::step::{CacheSpec, StepAction, StepSpec, ToolchainSpec};
use crate::trigger::{TriggerRule, TriggerSet};

/// Default per-job wall-clock timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Workflow-level orchestration settings, threaded into the orchestrator
/// rather than read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    /// Cancel sibling jobs once one job fails. The hosting platform
    /// enables this by default; quality-gate workflows typically turn it
    /// off so every check reports.
    pub fail_fast: bool,
}

impl Default for Strategy {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

/// One independently scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Job name, unique within the workflow.
    pub name: String,

    /// Wall-clock timeout covering provisioning and step execution.
    pub timeout: Duration,

    /// Environment entries every step of the job runs with.
    pub env: BTreeMap<String, String>,

    /// Steps, executed strictly in declared order.
    pub steps: Vec<StepSpec>,
}

impl JobSpec {
    /// Job with the default timeout and no extra environment.
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            timeout: DEFAULT_JOB_TIMEOUT,
            env: BTreeMap::new(),
            steps,
        }
    }

    /// Override the job timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a job-wide environment entry.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A validated workflow definition.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name.
    pub name: String,

    /// Trigger rules gating run creation.
    pub triggers: Vec<TriggerRule>,

    /// Orchestration policy.
    pub strategy: Strategy,

    /// Jobs dispatched for every matched event.
    pub jobs: Vec<JobSpec>,
}

impl Workflow {
    /// Parse and validate a workflow from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawWorkflow = toml::from_str(text)?;
        raw.into_workflow()
    }

    /// Load a workflow definition from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Compile the trigger rules into a matchable set.
    pub fn compile_triggers(&self) -> Result<TriggerSet, TriggerError> {
        TriggerSet::compile(&self.triggers)
    }
}

// ---------------------------------------------------------------------------
// Raw TOML shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    name: Option<String>,
    #[serde(default)]
    triggers: RawTriggers,
    #[serde(default)]
    strategy: RawStrategy,
    #[serde(default)]
    jobs: Vec<RawJob>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTriggers {
    push: Option<RawRule>,
    pull_request: Option<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    branches: Vec<String>,
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStrategy {
    #[serde(rename = "fail-fast")]
    fail_fast: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    name: String,
    #[serde(rename = "timeout-minutes")]
    timeout_minutes: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: Option<String>,
    run: Option<String>,
    command: Option<Vec<String>>,
    uses: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    components: Vec<String>,
    path: Option<PathBuf>,
    #[serde(rename = "key-files")]
    key_files: Option<Vec<PathBuf>>,
    #[serde(rename = "continue-on-error", default)]
    continue_on_error: bool,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Raw → model
// ---------------------------------------------------------------------------

impl RawWorkflow {
    fn into_workflow(self) -> Result<Workflow, ConfigError> {
        let mut triggers = Vec::new();
        if let Some(rule) = self.triggers.push {
            triggers.push(TriggerRule::new(EventKind::Push, rule.branches, rule.paths));
        }
        if let Some(rule) = self.triggers.pull_request {
            triggers.push(TriggerRule::new(
                EventKind::PullRequest,
                rule.branches,
                rule.paths,
            ));
        }

        let strategy = Strategy {
            fail_fast: self.strategy.fail_fast.unwrap_or(true),
        };

        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(self.jobs.len());
        for raw_job in self.jobs {
            if !seen.insert(raw_job.name.clone()) {
                return Err(ConfigError::DuplicateJob(raw_job.name));
            }
            jobs.push(raw_job.into_job()?);
        }

        Ok(Workflow {
            name: self.name.unwrap_or_else(|| "ci".to_string()),
            triggers,
            strategy,
            jobs,
        })
    }
}

impl RawJob {
    fn into_job(self) -> Result<JobSpec, ConfigError> {
        let timeout = self
            .timeout_minutes
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(DEFAULT_JOB_TIMEOUT);

        let steps = self
            .steps
            .into_iter()
            .map(RawStep::into_step)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JobSpec {
            name: self.name,
            timeout,
            env: self.env,
            steps,
        })
    }
}

impl RawStep {
    fn into_step(self) -> Result<StepSpec, ConfigError> {
        let has_command = self.run.is_some() || self.command.is_some();
        let label = self.label();

        if has_command && self.uses.is_some() {
            return Err(ConfigError::AmbiguousStep { step: label });
        }
        if self.run.is_some() && self.command.is_some() {
            return Err(ConfigError::AmbiguousStep { step: label });
        }

        let action = match (self.run, self.command, self.uses) {
            (Some(line), None, None) => {
                let command: Vec<String> =
                    line.split_whitespace().map(str::to_string).collect();
                if command.is_empty() {
                    return Err(ConfigError::EmptyCommand { step: label });
                }
                StepAction::Run { command }
            }
            (None, Some(command), None) => {
                if command.is_empty() {
                    return Err(ConfigError::EmptyCommand { step: label });
                }
                StepAction::Run { command }
            }
            (None, None, Some(uses)) => match uses.as_str() {
                "toolchain" => {
                    let channel =
                        self.channel.ok_or_else(|| ConfigError::MissingInput {
                            step: label.clone(),
                            uses: uses.clone(),
                            input: "channel".to_string(),
                        })?;
                    StepAction::InstallToolchain {
                        toolchain: ToolchainSpec {
                            channel,
                            components: self.components,
                        },
                    }
                }
                "cache" => {
                    let path = self.path.ok_or_else(|| ConfigError::MissingInput {
                        step: label.clone(),
                        uses: uses.clone(),
                        input: "path".to_string(),
                    })?;
                    StepAction::Cache {
                        cache: CacheSpec {
                            path,
                            key_files: self.key_files.unwrap_or_default(),
                        },
                    }
                }
                _ => {
                    return Err(ConfigError::UnknownAction { step: label, uses });
                }
            },
            _ => return Err(ConfigError::MissingAction { step: label }),
        };

        let name = self.name.unwrap_or_else(|| default_step_name(&action));

        Ok(StepSpec {
            name,
            action,
            continue_on_error: self.continue_on_error,
            env: self.env,
        })
    }

    /// Best label for error messages before the final name is known.
    fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(uses) = &self.uses {
            return uses.clone();
        }
        if let Some(run) = &self.run {
            return run.clone();
        }
        "<unnamed>".to_string()
    }
}

/// Derive a step name when the definition omits one.
fn default_step_name(action: &StepAction) -> String {
    match action {
        StepAction::Run { command } => command
            .first()
            .cloned()
            .unwrap_or_else(|| "run".to_string()),
        StepAction::InstallToolchain { .. } => "toolchain".to_string(),
        StepAction::Cache { .. } => "cache".to_string(),
    }
}
