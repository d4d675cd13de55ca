//! Completion reconciliation.
//!
//! [`Reconciler`] is the single authority over terminal job state. The
//! poller and the webhook ingest both race to report the same job; every
//! report is applied under the owning batch's lock, so exactly one report
//! per job transitions it and exactly one report per batch finalizes it.
//! Later reports for an already-terminal job are no-ops.
//!
//! Archive writes happen outside the state lock but under the batch's
//! archive gate, so a progress update can never land after the final one.

use std::sync::Arc;

use batchgen_archive::ArchiveSink;
use batchgen_core::types::{BatchId, JobId};
use chrono::Utc;

use crate::model::{FailureReason, JobRef, JobStatus, Outcome};
use crate::registry::{BatchSlot, Registry};

/// Result of applying a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportResult {
    /// The report transitioned the job. `finalized` is `true` for the one
    /// report that completed the batch.
    Applied { batch_id: BatchId, finalized: bool },
    /// The job was already terminal; nothing changed.
    AlreadyTerminal,
}

/// Errors raised by the reconciler.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The job is not in the registry (never registered or already evicted).
    #[error("Unknown job {0}")]
    UnknownJob(JobId),

    #[error("Unknown batch {0}")]
    UnknownBatch(BatchId),

    /// The batch already holds an entry for every requested unit.
    #[error("Batch {batch_id} already holds {requested} jobs")]
    BatchFull { batch_id: BatchId, requested: u32 },
}

pub struct Reconciler {
    registry: Arc<Registry>,
    archive: Arc<dyn ArchiveSink>,
}

impl Reconciler {
    pub fn new(registry: Arc<Registry>, archive: Arc<dyn ArchiveSink>) -> Self {
        Self { registry, archive }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Apply a terminal outcome for a job.
    ///
    /// Steps, all under the batch lock: reject if already terminal, set the
    /// job status, record the outcome on the batch, evaluate finalization.
    /// The final archive write runs afterwards, once, for the finalizing call.
    pub async fn report_outcome(
        &self,
        job_id: &str,
        outcome: Outcome,
    ) -> Result<ReportResult, ReconcileError> {
        let (batch_id, slot) = self
            .registry
            .slot_for_job(job_id)
            .await
            .map_err(|_| ReconcileError::UnknownJob(job_id.to_string()))?;

        let finalized = {
            let mut guard = slot.state.lock().await;
            let entry = &mut *guard;
            let job = entry
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| ReconcileError::UnknownJob(job_id.to_string()))?;

            if job.status.is_terminal() {
                tracing::debug!(
                    %batch_id,
                    job_id,
                    status = ?job.status,
                    "Duplicate outcome ignored, job already terminal",
                );
                return Ok(ReportResult::AlreadyTerminal);
            }

            let now = Utc::now();
            job.status = outcome.status();
            job.completed_at = Some(now);
            if let Outcome::Failed(reason) = &outcome {
                job.failure = Some(reason.clone());
            }

            tracing::info!(
                %batch_id,
                job_id,
                status = ?job.status,
                "Job outcome applied",
            );

            entry
                .batch
                .record_outcome(JobRef::Remote(job_id.to_string()), outcome);
            entry.batch.try_finalize(now)
        };

        if finalized {
            self.write_final(batch_id, &slot).await;
        }

        Ok(ReportResult::Applied {
            batch_id,
            finalized,
        })
    }

    /// Record a unit that the engine never accepted.
    ///
    /// The unit gets a `SubmissionFailed` entry in `job_ids`, `seen_ids` and
    /// `failed_ids` without a live job or a poller, so it still counts
    /// toward finalization. Reporting the same unit twice is a no-op.
    pub async fn record_submission_failure(
        &self,
        batch_id: BatchId,
        unit: u32,
        message: String,
    ) -> Result<ReportResult, ReconcileError> {
        let slot = self
            .registry
            .slot(batch_id)
            .await
            .map_err(|_| ReconcileError::UnknownBatch(batch_id))?;

        let job = JobRef::SubmissionFailed { unit };
        let finalized = {
            let mut entry = slot.state.lock().await;
            if entry.batch.job_ids.contains(&job) {
                return Ok(ReportResult::AlreadyTerminal);
            }
            let requested = entry.batch.requested;
            if entry.batch.job_ids.len() >= requested as usize {
                return Err(ReconcileError::BatchFull { batch_id, requested });
            }

            tracing::warn!(%batch_id, unit, error = %message, "Unit recorded as submission failure");

            entry.batch.job_ids.push(job.clone());
            entry
                .batch
                .record_outcome(job, Outcome::Failed(FailureReason::SubmissionFailed(message)));
            entry.batch.try_finalize(Utc::now())
        };

        if finalized {
            self.write_final(batch_id, &slot).await;
        }

        Ok(ReportResult::Applied {
            batch_id,
            finalized,
        })
    }

    /// Count one poll attempt. Returns the new attempt count.
    pub async fn record_poll_attempt(&self, job_id: &str) -> Result<u32, ReconcileError> {
        let (_, slot) = self
            .registry
            .slot_for_job(job_id)
            .await
            .map_err(|_| ReconcileError::UnknownJob(job_id.to_string()))?;
        let mut entry = slot.state.lock().await;
        let job = entry
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ReconcileError::UnknownJob(job_id.to_string()))?;
        job.retries += 1;
        Ok(job.retries)
    }

    /// Move a job from `submitted` to `processing`. Never touches a job
    /// that is already processing or terminal.
    pub async fn mark_processing(&self, job_id: &str) -> Result<(), ReconcileError> {
        let (_, slot) = self
            .registry
            .slot_for_job(job_id)
            .await
            .map_err(|_| ReconcileError::UnknownJob(job_id.to_string()))?;
        let mut entry = slot.state.lock().await;
        if let Some(job) = entry.jobs.get_mut(job_id) {
            if job.status == JobStatus::Submitted {
                job.status = JobStatus::Processing;
            }
        }
        Ok(())
    }

    /// Push the current batch state to the archive (best effort).
    ///
    /// Skipped once the batch is finalized: the final write owns the record
    /// from then on.
    pub async fn sync_progress(&self, batch_id: BatchId) -> Result<(), ReconcileError> {
        let slot = self
            .registry
            .slot(batch_id)
            .await
            .map_err(|_| ReconcileError::UnknownBatch(batch_id))?;

        let _gate = slot.archive_gate.lock().await;
        let snapshot = {
            let entry = slot.state.lock().await;
            if entry.batch.finalized {
                return Ok(());
            }
            entry.batch.snapshot(Utc::now())
        };

        if let Err(e) = self
            .archive
            .update(&snapshot.archive_record_id, &snapshot.archive_fields())
            .await
        {
            tracing::warn!(%batch_id, error = %e, "Progress update to archive failed");
        }
        Ok(())
    }

    // ---- private helpers ----

    /// Write the finalized batch to the archive. Only the call that flipped
    /// `finalized` reaches this, so the write happens once per batch.
    async fn write_final(&self, batch_id: BatchId, slot: &BatchSlot) {
        let _gate = slot.archive_gate.lock().await;
        let snapshot = slot.state.lock().await.batch.snapshot(Utc::now());

        tracing::info!(
            %batch_id,
            seen = snapshot.seen_ids.len(),
            failed = snapshot.failed_ids.len(),
            outputs = snapshot.outputs.len(),
            elapsed_secs = snapshot.elapsed_secs,
            "Batch finalized",
        );

        if let Err(e) = self
            .archive
            .update(&snapshot.archive_record_id, &snapshot.archive_fields())
            .await
        {
            // The batch stays finalized; the archive record may be stale.
            tracing::error!(%batch_id, error = %e, "Final archive write failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
