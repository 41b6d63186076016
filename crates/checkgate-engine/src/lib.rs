//! checkgate-engine - quality-gate pipeline execution
//!
//! Provides the execution half of checkgate:
//! - Step Runner: strictly sequential step execution with fail-stop
//!   semantics and a per-job wall-clock timeout
//! - Job Orchestrator: parallel, isolated jobs with a fail-fast policy
//!   flag and pass/fail aggregation
//! - Pipeline: trigger-gated entry point turning events into runs

pub mod orchestrator;
pub mod pipeline;
pub mod runner;

// Re-export key types
pub use orchestrator::{Orchestrator, RunResult};
pub use pipeline::Pipeline;
pub use runner::{JobContext, JobReport, JobStatus, StepOutcome, StepRunner};
