//! Parallel job orchestration and run aggregation.

use std::time::Instant;

use checkgate_core::config::{JobSpec, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::runner::{JobContext, JobReport, JobStatus, StepRunner};

/// Result of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run was dispatched.
    pub started_at: DateTime<Utc>,

    /// Whether every job passed.
    pub success: bool,

    /// Per-job reports, in dispatch order.
    pub jobs: Vec<JobReport>,

    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl RunResult {
    /// Number of jobs that passed.
    pub fn passed_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.passed()).count()
    }

    /// Number of jobs that did not pass (failed, timed out or cancelled).
    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| !j.passed()).count()
    }
}

/// Dispatches jobs in parallel and aggregates their statuses.
///
/// Jobs are isolated: each runs in its own task with its own runner, and
/// the only shared resource is the (best-effort) cache backend inside
/// the context. With fail-fast disabled a failing job never cancels its
/// siblings — every dispatched job reaches a terminal status. With
/// fail-fast enabled, the first non-passing job aborts the in-flight
/// remainder, which report `Cancelled`.
pub struct Orchestrator {
    strategy: Strategy,
    ctx: JobContext,
}

impl Orchestrator {
    /// Orchestrator with explicit workflow-level settings.
    pub fn new(strategy: Strategy, ctx: JobContext) -> Self {
        Self { strategy, ctx }
    }

    /// Run every job to a terminal status and aggregate the result.
    pub async fn run_all(&self, jobs: Vec<JobSpec>) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            run_id = %run_id,
            jobs = jobs.len(),
            fail_fast = self.strategy.fail_fast,
            "Starting run"
        );

        let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.into_iter().enumerate() {
            let runner = StepRunner::new(self.ctx.clone());
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let report = runner.run(&job).await;
                // The receiver outlives every sender; ignore close races.
                let _ = tx.send((index, report));
            }));
        }
        drop(tx);

        let mut reports: Vec<Option<JobReport>> = names.iter().map(|_| None).collect();
        let mut cancelling = false;
        while let Some((index, report)) = rx.recv().await {
            if !report.passed() && self.strategy.fail_fast && !cancelling {
                cancelling = true;
                warn!(
                    run_id = %run_id,
                    job = %report.job_name,
                    "Job did not pass; fail-fast cancelling remaining jobs"
                );
                for handle in &handles {
                    handle.abort();
                }
            }
            reports[index] = Some(report);
        }

        // The channel closed, so every task is done; settle the handles
        // and fill in slots for cancelled or crashed jobs.
        for (index, handle) in handles.into_iter().enumerate() {
            let name = names[index].as_str();
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {
                    if reports[index].is_none() {
                        reports[index] = Some(JobReport::cancelled(name));
                    }
                }
                Err(err) => {
                    warn!(run_id = %run_id, job = %name, error = %err, "Job task panicked");
                    if reports[index].is_none() {
                        reports[index] = Some(JobReport {
                            job_name: name.to_string(),
                            status: JobStatus::Failed,
                            steps: Vec::new(),
                            duration_ms: 0,
                        });
                    }
                }
            }
        }

        let jobs: Vec<JobReport> = reports
            .into_iter()
            .zip(&names)
            .map(|(report, name)| report.unwrap_or_else(|| JobReport::cancelled(name.as_str())))
            .collect();

        let success = jobs.iter().all(|j| j.passed());
        let duration_ms = start.elapsed().as_millis() as u64;
        if success {
            info!(run_id = %run_id, duration_ms, "Run passed");
        } else {
            info!(
                run_id = %run_id,
                duration_ms,
                failed = jobs.iter().filter(|j| !j.passed()).count(),
                "Run failed"
            );
        }

        RunResult {
            run_id,
            started_at,
            success,
            jobs,
            duration_ms,
        }
    }
}
