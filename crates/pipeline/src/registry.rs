//! In-memory job and batch registry.
//!
//! Each batch lives in its own [`BatchSlot`]: the batch aggregate and all of
//! its jobs sit behind one mutex, so every mutation of a batch and its jobs
//! is serialized. A second per-batch lock orders archive writes.
//!
//! The registry is injected (never global) and enforces a
//! [`RetentionPolicy`]: finalized batches are evicted once their grace
//! period has elapsed, so memory does not grow for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use batchgen_core::error::CoreError;
use batchgen_core::types::{BatchId, JobId, Timestamp};
use tokio::sync::{Mutex, RwLock};

use crate::model::{Batch, BatchSnapshot, Job, JobRef};

/// Default time a finalized batch stays queryable.
const DEFAULT_RETENTION_GRACE: Duration = Duration::from_secs(3600);

/// Default interval between eviction sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// How long finalized batches are kept and how often they are swept.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub grace: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            grace: DEFAULT_RETENTION_GRACE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Errors returned by registry lookups and inserts.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Batch {0} not found")]
    BatchNotFound(BatchId),

    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Batch {0} already registered")]
    DuplicateBatch(BatchId),

    #[error("Job {0} already registered")]
    DuplicateJob(JobId),

    #[error("Batch {batch_id} already has all {requested} units")]
    BatchFull { batch_id: BatchId, requested: u32 },
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::BatchNotFound(id) => CoreError::NotFound {
                entity: "Batch",
                id: id.to_string(),
            },
            RegistryError::JobNotFound(id) => CoreError::NotFound { entity: "Job", id },
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Mutable state of one batch.
#[derive(Debug)]
pub(crate) struct BatchEntry {
    pub(crate) batch: Batch,
    pub(crate) jobs: HashMap<JobId, Job>,
}

/// One batch plus its locks.
#[derive(Debug)]
pub(crate) struct BatchSlot {
    pub(crate) state: Mutex<BatchEntry>,
    /// Held across archive writes so they land in the order they were decided.
    pub(crate) archive_gate: Mutex<()>,
}

/// Keyed store of batches and the jobs they own.
#[derive(Debug)]
pub struct Registry {
    batches: RwLock<HashMap<BatchId, Arc<BatchSlot>>>,
    /// Job id to owning batch.
    job_index: RwLock<HashMap<JobId, BatchId>>,
    retention: RetentionPolicy,
}

impl Registry {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            batches: RwLock::new(HashMap::new()),
            job_index: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Register a new batch with no jobs.
    pub async fn create_batch(&self, batch: Batch) -> Result<(), RegistryError> {
        let batch_id = batch.id;
        let mut batches = self.batches.write().await;
        if batches.contains_key(&batch_id) {
            return Err(RegistryError::DuplicateBatch(batch_id));
        }
        let slot = BatchSlot {
            state: Mutex::new(BatchEntry {
                batch,
                jobs: HashMap::new(),
            }),
            archive_gate: Mutex::new(()),
        };
        batches.insert(batch_id, Arc::new(slot));
        Ok(())
    }

    /// Register a job accepted by the engine and append it to its batch.
    pub async fn create_job(&self, job: Job) -> Result<(), RegistryError> {
        let slot = self.slot(job.batch_id).await?;

        // Index first so a concurrent duplicate is rejected before the batch
        // is touched.
        {
            let mut index = self.job_index.write().await;
            if index.contains_key(&job.id) {
                return Err(RegistryError::DuplicateJob(job.id));
            }
            index.insert(job.id.clone(), job.batch_id);
        }

        let mut entry = slot.state.lock().await;
        if entry.batch.job_ids.len() >= entry.batch.requested as usize {
            let requested = entry.batch.requested;
            drop(entry);
            self.job_index.write().await.remove(&job.id);
            return Err(RegistryError::BatchFull {
                batch_id: job.batch_id,
                requested,
            });
        }
        entry.batch.job_ids.push(JobRef::Remote(job.id.clone()));
        entry.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, RegistryError> {
        let (_, slot) = self.slot_for_job(job_id).await?;
        let entry = slot.state.lock().await;
        entry
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    pub async fn get_batch(&self, batch_id: BatchId) -> Result<BatchSnapshot, RegistryError> {
        let slot = self.slot(batch_id).await?;
        let entry = slot.state.lock().await;
        Ok(entry.batch.snapshot(chrono::Utc::now()))
    }

    pub async fn batch_count(&self) -> usize {
        self.batches.read().await.len()
    }

    pub async fn job_count(&self) -> usize {
        self.job_index.read().await.len()
    }

    /// Drop finalized batches (and their jobs) whose completion is older
    /// than the grace period. Unfinalized batches are never evicted.
    pub async fn evict_expired(&self, now: Timestamp) -> usize {
        let grace = chrono::Duration::from_std(self.retention.grace)
            .unwrap_or(chrono::Duration::MAX);

        let candidates: Vec<(BatchId, Arc<BatchSlot>)> = self
            .batches
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut expired = Vec::new();
        for (batch_id, slot) in candidates {
            let entry = slot.state.lock().await;
            let due = match entry.batch.completed_at {
                Some(done) if entry.batch.finalized => now - done >= grace,
                _ => false,
            };
            if due {
                expired.push((batch_id, entry.jobs.keys().cloned().collect::<Vec<_>>()));
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut batches = self.batches.write().await;
        let mut index = self.job_index.write().await;
        for (batch_id, job_ids) in &expired {
            batches.remove(batch_id);
            for job_id in job_ids {
                index.remove(job_id);
            }
        }
        expired.len()
    }

    // ---- crate-internal accessors ----

    pub(crate) async fn slot(&self, batch_id: BatchId) -> Result<Arc<BatchSlot>, RegistryError> {
        self.batches
            .read()
            .await
            .get(&batch_id)
            .cloned()
            .ok_or(RegistryError::BatchNotFound(batch_id))
    }

    pub(crate) async fn slot_for_job(
        &self,
        job_id: &str,
    ) -> Result<(BatchId, Arc<BatchSlot>), RegistryError> {
        let batch_id = self
            .job_index
            .read()
            .await
            .get(job_id)
            .copied()
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;
        let slot = self.slot(batch_id).await?;
        Ok((batch_id, slot))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
