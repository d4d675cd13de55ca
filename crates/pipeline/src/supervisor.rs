//! Ownership of the background pollers and batch submissions.
//!
//! Every poller and every submission loop runs as a tracked task under one
//! master cancellation token, so the number of live tasks is observable and
//! shutdown can drain them instead of dropping them mid-flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use batchgen_core::types::BatchId;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::poller::{PollExit, Poller};

pub struct PollerSupervisor {
    poller: Arc<Poller>,
    tracker: TaskTracker,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl PollerSupervisor {
    pub fn new(poller: Arc<Poller>) -> Self {
        Self {
            poller,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Start polling `job_id` in the background.
    pub fn spawn(&self, job_id: String) {
        let poller = Arc::clone(&self.poller);
        let cancel = self.cancel.child_token();
        let label = job_id.clone();

        let handle = tokio::spawn(async move { poller.run(&job_id, cancel).await });

        self.tracker.spawn(async move {
            match handle.await {
                Ok(PollExit::BudgetExhausted) => {
                    tracing::warn!(job_id = %label, "Poller gave up, job marked failed");
                }
                Ok(exit) => {
                    tracing::debug!(job_id = %label, ?exit, "Poller finished");
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(job_id = %label, "Poller task panicked");
                }
                Err(e) => {
                    tracing::warn!(job_id = %label, error = %e, "Poller task aborted");
                }
            }
        });
    }

    /// Run the unit-submission loop of `batch_id` in the background.
    ///
    /// `work` receives a child of the master token and must settle every
    /// unit it has not submitted once that token is cancelled.
    pub fn spawn_submission<F, Fut>(&self, batch_id: BatchId, work: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work(self.cancel.child_token()));

        self.tracker.spawn(async move {
            match handle.await {
                Ok(()) => tracing::debug!(%batch_id, "Submission loop finished"),
                Err(e) if e.is_panic() => {
                    tracing::error!(%batch_id, "Submission task panicked");
                }
                Err(e) => tracing::warn!(%batch_id, error = %e, "Submission task aborted"),
            }
        });
    }

    /// Number of pollers and submission loops still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far, and every poller those tasks
    /// spawn, has exited.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting work, give running pollers `grace` to finish on their
    /// own, then cancel whatever is left and wait for it to exit.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!(active = self.active(), "Shutting down poller supervisor");
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::info!(
                remaining = self.active(),
                "Grace period elapsed, cancelling pollers"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }

        tracing::info!("Poller supervisor shut down complete");
    }
}

#[cfg(test)]
mod tests {
    use batchgen_core::backoff::BackoffConfig;
    use chrono::Utc;

    use super::*;
    use crate::model::{Batch, Job, JobStatus};
    use crate::poller::PollConfig;
    use crate::reconciler::Reconciler;
    use crate::registry::Registry;
    use crate::testing::{RecordingArchive, ScriptStep, ScriptedEngine};

    async fn supervisor(jobs: u32) -> (PollerSupervisor, Arc<ScriptedEngine>, Arc<Reconciler>) {
        let registry = Arc::new(Registry::default());
        let batch = Batch::new(
            uuid::Uuid::new_v4(),
            "rec-1".into(),
            "p".into(),
            "512x512".into(),
            jobs,
            Utc::now(),
        );
        let batch_id = batch.id;
        registry.create_batch(batch).await.unwrap();
        for unit in 0..jobs {
            registry
                .create_job(Job::new(format!("job-{unit}"), batch_id, unit, Utc::now()))
                .await
                .unwrap();
        }

        let engine = Arc::new(ScriptedEngine::new());
        let reconciler = Arc::new(Reconciler::new(
            registry,
            Arc::new(RecordingArchive::default()),
        ));
        let config = PollConfig {
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
            max_attempts: 1_000,
        };
        let poller = Arc::new(Poller::new(engine.clone(), reconciler.clone(), config));
        (PollerSupervisor::new(poller), engine, reconciler)
    }

    #[tokio::test]
    async fn pollers_run_to_completion() {
        let (sup, engine, reconciler) = supervisor(2).await;
        engine.script("job-0", vec![ScriptStep::completed("a.png")]);
        engine.script("job-1", vec![ScriptStep::failed()]);

        sup.spawn("job-0".into());
        sup.spawn("job-1".into());
        sup.wait_idle().await;

        assert_eq!(sup.active(), 0);
        let registry = reconciler.registry();
        assert_eq!(registry.get_job("job-0").await.unwrap().status, JobStatus::Completed);
        assert_eq!(registry.get_job("job-1").await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn shutdown_cancels_pollers_after_grace() {
        let (sup, _, reconciler) = supervisor(1).await;
        // Unscripted: the job stays processing, so the poller never exits on its own.
        sup.spawn("job-0".into());
        assert_eq!(sup.active(), 1);

        sup.shutdown(Duration::from_millis(20)).await;

        assert_eq!(sup.active(), 0);
        let job = reconciler.registry().get_job("job-0").await.unwrap();
        assert!(!job.status.is_terminal());
    }

    #[tokio::test]
    async fn submission_tasks_observe_shutdown_cancellation() {
        let (sup, _, _) = supervisor(1).await;
        let (tx, rx) = tokio::sync::oneshot::channel();
        sup.spawn_submission(uuid::Uuid::new_v4(), |cancel| async move {
            cancel.cancelled().await;
            let _ = tx.send(());
        });
        assert_eq!(sup.active(), 1);

        sup.shutdown(Duration::from_millis(10)).await;

        assert!(rx.await.is_ok());
        assert_eq!(sup.active(), 0);
    }
}
