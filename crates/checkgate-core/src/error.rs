//! Error types for checkgate-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while compiling trigger rules.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// A branch or path pattern failed to compile.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Errors raised while loading or validating a workflow definition.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Workflow file could not be read.
    #[error("failed to read workflow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workflow file is not valid TOML.
    #[error("failed to parse workflow definition: {0}")]
    Parse(#[from] toml::de::Error),

    /// A step declares both a command and an action reference.
    #[error("step '{step}' declares both `run` and `uses`")]
    AmbiguousStep { step: String },

    /// A step declares neither a command nor an action reference.
    #[error("step '{step}' declares neither `run`, `command`, nor `uses`")]
    MissingAction { step: String },

    /// A command step has no executable.
    #[error("step '{step}' has an empty command")]
    EmptyCommand { step: String },

    /// A step references an action this engine does not provide.
    #[error("step '{step}' references unknown action '{uses}'")]
    UnknownAction { step: String, uses: String },

    /// An action step is missing a required input.
    #[error("step '{step}' is missing required input `{input}` for action '{uses}'")]
    MissingInput {
        step: String,
        uses: String,
        input: String,
    },

    /// Two jobs share a name.
    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),
}
