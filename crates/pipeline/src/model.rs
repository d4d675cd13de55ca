//! Job and batch records.
//!
//! A [`Batch`] owns its [`Job`]s. Jobs reach exactly one terminal status;
//! the batch finalizes once every requested unit has been seen terminal.

use std::fmt;

use batchgen_archive::record::join_list;
use batchgen_archive::{ArchiveFields, RecordStatus};
use batchgen_core::types::{ArchiveRecordId, BatchId, JobId, Timestamp};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Local job lifecycle: `submitted -> processing -> {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Batch lifecycle. There is no failed batch; a batch whose jobs all
/// failed still finalizes as `Completed` (see [`BatchSnapshot::all_failed`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
}

// ---------------------------------------------------------------------------
// Job references and outcomes
// ---------------------------------------------------------------------------

/// Entry in a batch's job list.
///
/// Units that never reached the engine get a `SubmissionFailed` entry so
/// they still count toward finalization without sharing the engine's id
/// space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobRef {
    Remote(JobId),
    SubmissionFailed { unit: u32 },
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => f.write_str(id),
            Self::SubmissionFailed { unit } => write!(f, "submission-failed-{unit}"),
        }
    }
}

/// Why a job ended up failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The engine reported the job as failed.
    Remote(Option<String>),
    /// The poller ran out of attempts without a terminal remote status.
    RetryBudgetExhausted,
    /// The unit was never accepted by the engine.
    SubmissionFailed(String),
}

/// Terminal result reported for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { outputs: Vec<String> },
    Failed(FailureReason),
}

impl Outcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of generation work accepted by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub batch_id: BatchId,
    /// 0-based position of the unit within its batch.
    pub unit: u32,
    pub status: JobStatus,
    /// Poll attempts made so far.
    pub retries: u32,
    pub failure: Option<FailureReason>,
    pub submitted_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    pub fn new(id: JobId, batch_id: BatchId, unit: u32, now: Timestamp) -> Self {
        Self {
            id,
            batch_id,
            unit,
            status: JobStatus::Submitted,
            retries: 0,
            failure: None,
            submitted_at: now,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Aggregate state of one user request.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub archive_record_id: ArchiveRecordId,
    pub prompt: String,
    pub size: String,
    /// Number of units requested; the size `job_ids` grows to.
    pub requested: u32,
    /// Submitted units in submission order, including submission failures.
    pub job_ids: Vec<JobRef>,
    /// Units seen terminal, in arrival order.
    pub seen_ids: Vec<JobRef>,
    /// Subset of `seen_ids` that failed.
    pub failed_ids: Vec<JobRef>,
    pub failures: Vec<(JobRef, FailureReason)>,
    /// Output references in arrival order.
    pub outputs: Vec<String>,
    pub status: BatchStatus,
    pub finalized: bool,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Batch {
    pub fn new(
        id: BatchId,
        archive_record_id: ArchiveRecordId,
        prompt: String,
        size: String,
        requested: u32,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            archive_record_id,
            prompt,
            size,
            requested,
            job_ids: Vec::with_capacity(requested as usize),
            seen_ids: Vec::new(),
            failed_ids: Vec::new(),
            failures: Vec::new(),
            outputs: Vec::new(),
            status: BatchStatus::Processing,
            finalized: false,
            created_at: now,
            completed_at: None,
        }
    }

    /// Finalization predicate: every requested unit has been seen terminal.
    ///
    /// `seen_ids ⊆ job_ids` and `job_ids` never exceeds `requested`, so this
    /// also implies every unit has been submitted (or failed to submit).
    pub fn is_complete(&self) -> bool {
        self.seen_ids.len() == self.requested as usize
    }

    /// Record a terminal outcome for `job`.
    pub(crate) fn record_outcome(&mut self, job: JobRef, outcome: Outcome) {
        self.seen_ids.push(job.clone());
        match outcome {
            Outcome::Completed { outputs } => self.outputs.extend(outputs),
            Outcome::Failed(reason) => {
                self.failed_ids.push(job.clone());
                self.failures.push((job, reason));
            }
        }
    }

    /// Flip to `Completed` if the predicate holds and the batch has not
    /// been finalized yet. Returns `true` only for the call that finalized.
    pub(crate) fn try_finalize(&mut self, now: Timestamp) -> bool {
        if self.finalized || !self.is_complete() {
            return false;
        }
        self.finalized = true;
        self.status = BatchStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    pub fn snapshot(&self, now: Timestamp) -> BatchSnapshot {
        let end = self.completed_at.unwrap_or(now);
        let elapsed_secs = (end - self.created_at).num_milliseconds() as f64 / 1000.0;

        BatchSnapshot {
            id: self.id,
            archive_record_id: self.archive_record_id.clone(),
            prompt: self.prompt.clone(),
            size: self.size.clone(),
            status: self.status,
            finalized: self.finalized,
            all_failed: self.finalized && self.failed_ids.len() == self.seen_ids.len(),
            requested: self.requested,
            submitted: self.job_ids.len() as u32,
            completed: (self.seen_ids.len() - self.failed_ids.len()) as u32,
            failed: self.failed_ids.len() as u32,
            job_ids: to_strings(&self.job_ids),
            seen_ids: to_strings(&self.seen_ids),
            failed_ids: to_strings(&self.failed_ids),
            failures: self
                .failures
                .iter()
                .map(|(job, reason)| FailureEntry {
                    job_id: job.to_string(),
                    reason: reason.clone(),
                })
                .collect(),
            outputs: self.outputs.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            elapsed_secs,
        }
    }
}

fn to_strings(refs: &[JobRef]) -> Vec<String> {
    refs.iter().map(ToString::to_string).collect()
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A failed unit and why it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub job_id: String,
    pub reason: FailureReason,
}

/// Point-in-time copy of a batch, safe to hand out of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub id: BatchId,
    pub archive_record_id: ArchiveRecordId,
    pub prompt: String,
    pub size: String,
    pub status: BatchStatus,
    pub finalized: bool,
    /// Finalized with no successful job.
    pub all_failed: bool,
    pub requested: u32,
    pub submitted: u32,
    pub completed: u32,
    pub failed: u32,
    pub job_ids: Vec<String>,
    pub seen_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub failures: Vec<FailureEntry>,
    pub outputs: Vec<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub elapsed_secs: f64,
}

impl BatchSnapshot {
    /// Full record contents for an archive update.
    pub fn archive_fields(&self) -> ArchiveFields {
        let status = if self.finalized {
            RecordStatus::Completed
        } else {
            RecordStatus::Processing
        };

        ArchiveFields {
            prompt: Some(self.prompt.clone()),
            size: Some(self.size.clone()),
            status: Some(status),
            run_id: Some(self.id.to_string()),
            requested_jobs: Some(self.requested),
            job_ids: Some(join_list(&self.job_ids)),
            seen_ids: Some(join_list(&self.seen_ids)),
            failed_ids: Some(join_list(&self.failed_ids)),
            outputs: Some(join_list(&self.outputs)),
            created_at: Some(self.created_at),
            completed_at: self.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn batch(requested: u32) -> Batch {
        Batch::new(
            uuid::Uuid::new_v4(),
            "rec-1".into(),
            "prompt".into(),
            "512x512".into(),
            requested,
            Utc::now(),
        )
    }

    #[test]
    fn submission_failure_ref_is_distinct_from_engine_ids() {
        let synthetic = JobRef::SubmissionFailed { unit: 1 };
        let remote = JobRef::Remote("submission-failed-1".into());
        assert_ne!(synthetic, remote);
        assert_eq!(synthetic.to_string(), "submission-failed-1");
    }

    #[test]
    fn predicate_requires_every_requested_unit() {
        let mut b = batch(2);
        b.job_ids.push(JobRef::Remote("a".into()));
        b.record_outcome(JobRef::Remote("a".into()), Outcome::Completed { outputs: vec![] });

        // Only one of two units submitted so far.
        assert!(!b.is_complete());
        assert!(!b.try_finalize(Utc::now()));
        assert_eq!(b.status, BatchStatus::Processing);
    }

    #[test]
    fn try_finalize_fires_once() {
        let mut b = batch(1);
        b.job_ids.push(JobRef::Remote("a".into()));
        b.record_outcome(
            JobRef::Remote("a".into()),
            Outcome::Failed(FailureReason::RetryBudgetExhausted),
        );

        assert!(b.try_finalize(Utc::now()));
        assert!(!b.try_finalize(Utc::now()));
        assert_eq!(b.status, BatchStatus::Completed);
        assert!(b.finalized);
    }

    #[test]
    fn all_failed_batch_still_completes_and_is_flagged() {
        let mut b = batch(1);
        b.job_ids.push(JobRef::SubmissionFailed { unit: 0 });
        b.record_outcome(
            JobRef::SubmissionFailed { unit: 0 },
            Outcome::Failed(FailureReason::SubmissionFailed("503".into())),
        );
        b.try_finalize(Utc::now());

        let snap = b.snapshot(Utc::now());
        assert_eq!(snap.status, BatchStatus::Completed);
        assert!(snap.all_failed);
        assert!(snap.outputs.is_empty());
        assert_eq!(snap.failures[0].job_id, "submission-failed-0");
    }

    #[test]
    fn archive_fields_reflect_finalization() {
        let mut b = batch(1);
        b.job_ids.push(JobRef::Remote("a".into()));
        b.record_outcome(
            JobRef::Remote("a".into()),
            Outcome::Completed {
                outputs: vec!["https://cdn/a.png".into()],
            },
        );

        let fields = b.snapshot(Utc::now()).archive_fields();
        assert_eq!(fields.status, Some(RecordStatus::Processing));

        b.try_finalize(Utc::now());
        let fields = b.snapshot(Utc::now()).archive_fields();
        assert_eq!(fields.status, Some(RecordStatus::Completed));
        assert_eq!(fields.outputs.as_deref(), Some("https://cdn/a.png"));
        assert_eq!(fields.seen_ids.as_deref(), Some("a"));
        assert!(fields.completed_at.is_some());
    }

    #[test]
    fn failure_reason_serializes_tagged() {
        let value = serde_json::to_value(FailureReason::Remote(Some("nsfw".into()))).unwrap();
        assert_eq!(value["kind"], "remote");
        assert_eq!(value["message"], "nsfw");
    }
}
