//! Per-job status polling.
//!
//! A [`Poller`] queries the engine for one job on a bounded exponential
//! schedule until it sees a terminal status, the job becomes terminal by
//! another path (usually a webhook), or the attempt budget runs out. Every
//! terminal observation is handed to the [`Reconciler`]; the poller never
//! writes job state itself.

use std::sync::Arc;
use std::time::Duration;

use batchgen_core::backoff::{next_delay, total_delay, BackoffConfig};
use batchgen_engine::api::GenerationEngine;
use batchgen_engine::messages::RemoteStatus;
use tokio_util::sync::CancellationToken;

use crate::model::{FailureReason, Outcome};
use crate::reconciler::{ReconcileError, ReportResult, Reconciler};

/// Default number of status queries before a job is declared failed.
const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Polling schedule for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Sleep before each attempt: starts at `initial_delay`, grows by
    /// `multiplier`, clamped at `max_delay`.
    pub backoff: BackoffConfig,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(30),
                multiplier: 1.5,
            },
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Upper bound on the time spent sleeping before a job is given up on.
    ///
    /// The loop sleeps once before every query plus once before the final
    /// budget check.
    pub fn max_wait(&self) -> Duration {
        total_delay(self.max_attempts + 2, &self.backoff)
    }
}

/// Why a polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// This poller reported the job's terminal outcome.
    Reported,
    /// Another path made the job terminal first.
    AlreadyTerminal,
    /// The attempt budget ran out; the job was reported failed.
    BudgetExhausted,
    Cancelled,
    /// The job left the registry while being polled.
    UnknownJob,
}

pub struct Poller {
    engine: Arc<dyn GenerationEngine>,
    reconciler: Arc<Reconciler>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        reconciler: Arc<Reconciler>,
        config: PollConfig,
    ) -> Self {
        Self {
            engine,
            reconciler,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `job_id` until it is terminal or the budget is spent.
    pub async fn run(&self, job_id: &str, cancel: CancellationToken) -> PollExit {
        let mut delay = self.config.backoff.initial_delay;

        tracing::debug!(job_id, max_attempts = self.config.max_attempts, "Poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id, "Poller cancelled");
                    return PollExit::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, &self.config.backoff);

            // A webhook may have settled the job while we slept.
            match self.reconciler.registry().get_job(job_id).await {
                Ok(job) if job.status.is_terminal() => {
                    tracing::debug!(job_id, "Job already terminal, poller exiting");
                    return PollExit::AlreadyTerminal;
                }
                Ok(_) => {}
                Err(_) => return PollExit::UnknownJob,
            }

            let attempt = match self.reconciler.record_poll_attempt(job_id).await {
                Ok(n) => n,
                Err(_) => return PollExit::UnknownJob,
            };
            if attempt > self.config.max_attempts {
                tracing::warn!(job_id, attempts = attempt - 1, "Poll budget exhausted");
                let outcome = Outcome::Failed(FailureReason::RetryBudgetExhausted);
                return match self.report(job_id, outcome).await {
                    PollExit::Reported => PollExit::BudgetExhausted,
                    other => other,
                };
            }

            tracing::debug!(job_id, attempt, "Polling job status");
            let response = match self.engine.status(job_id).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(job_id, attempt, error = %e, "Status query failed, will retry");
                    continue;
                }
            };

            match response.status {
                RemoteStatus::Completed if !response.outputs.is_empty() => {
                    let outcome = Outcome::Completed {
                        outputs: response.outputs,
                    };
                    return self.report(job_id, outcome).await;
                }
                RemoteStatus::Completed => {
                    tracing::warn!(job_id, "Engine reported completion without outputs");
                    let reason = FailureReason::Remote(Some(
                        "completed without outputs".to_string(),
                    ));
                    return self.report(job_id, Outcome::Failed(reason)).await;
                }
                RemoteStatus::Failed => {
                    let reason = FailureReason::Remote(response.error);
                    return self.report(job_id, Outcome::Failed(reason)).await;
                }
                RemoteStatus::Processing => {
                    if self.reconciler.mark_processing(job_id).await.is_err() {
                        return PollExit::UnknownJob;
                    }
                }
                RemoteStatus::Created => {}
                RemoteStatus::Unknown(raw) => {
                    tracing::debug!(job_id, status = %raw, "Unrecognised remote status");
                }
            }
        }
    }

    async fn report(&self, job_id: &str, outcome: Outcome) -> PollExit {
        match self.reconciler.report_outcome(job_id, outcome).await {
            Ok(ReportResult::Applied { .. }) => PollExit::Reported,
            Ok(ReportResult::AlreadyTerminal) => PollExit::AlreadyTerminal,
            Err(
                ReconcileError::UnknownJob(_)
                | ReconcileError::UnknownBatch(_)
                | ReconcileError::BatchFull { .. },
            ) => PollExit::UnknownJob,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
