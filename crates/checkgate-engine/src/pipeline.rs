//! Trigger-gated pipeline entry point.
//!
//! Flow: event → trigger gate → orchestrator → per-job
//! (provision → cache restore → steps → cache save) → aggregated result.

use anyhow::Context;
use checkgate_core::config::Workflow;
use checkgate_core::event::Event;
use checkgate_core::trigger::TriggerSet;
use tracing::{debug, info};

use crate::orchestrator::{Orchestrator, RunResult};
use crate::runner::JobContext;

/// A workflow bound to its capabilities, ready to evaluate events.
pub struct Pipeline {
    workflow: Workflow,
    triggers: TriggerSet,
    orchestrator: Orchestrator,
}

impl Pipeline {
    /// Bind a workflow to a job context, compiling its trigger rules.
    pub fn new(workflow: Workflow, ctx: JobContext) -> anyhow::Result<Self> {
        let triggers = workflow
            .compile_triggers()
            .context("compiling workflow triggers")?;
        let orchestrator = Orchestrator::new(workflow.strategy.clone(), ctx);
        Ok(Self {
            workflow,
            triggers,
            orchestrator,
        })
    }

    /// The bound workflow.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Evaluate a single event.
    ///
    /// Returns `None` when the event matches no trigger rule: the run is
    /// never created, which is observably different from a run that is
    /// created and skipped.
    pub async fn handle(&self, event: &Event) -> Option<RunResult> {
        if !self.triggers.matches(event) {
            debug!(
                kind = %event.kind,
                branch = %event.branch,
                workflow = %self.workflow.name,
                "Event matched no trigger rule; run not created"
            );
            return None;
        }

        info!(
            kind = %event.kind,
            branch = %event.branch,
            workflow = %self.workflow.name,
            "Trigger matched; creating run"
        );
        Some(self.orchestrator.run_all(self.workflow.jobs.clone()).await)
    }
}
