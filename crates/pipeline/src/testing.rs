//! In-memory fakes for the engine, archive and input seams.
//!
//! Compiled for this crate's tests and, behind the `test-support`
//! feature, for tests in downstream crates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use batchgen_archive::{ArchiveError, ArchiveFields, ArchiveSink, RecordStatus};
use batchgen_core::types::{ArchiveRecordId, JobId};
use batchgen_engine::api::{EngineError, GenerationEngine};
use batchgen_engine::inputs::{InputError, InputPreparer, PreparedInputs};
use batchgen_engine::messages::{
    ImageInput, ImageRole, JobStatusResponse, RemoteStatus, SubmitJobRequest,
};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Status(RemoteStatus, Vec<String>),
    /// The query fails at the transport level.
    Error,
}

impl ScriptStep {
    pub fn completed(output: &str) -> Self {
        Self::Status(RemoteStatus::Completed, vec![output.to_string()])
    }

    pub fn failed() -> Self {
        Self::Status(RemoteStatus::Failed, Vec::new())
    }

    pub fn processing() -> Self {
        Self::Status(RemoteStatus::Processing, Vec::new())
    }
}

/// Engine fake. Submission `n` (0-based, in call order) returns `job-{n}`
/// unless `n` was marked to fail. Status queries play back per-job scripts;
/// once a script is exhausted its last step repeats, and unscripted jobs
/// report `processing` forever.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    submissions: AtomicU32,
    failing_submissions: Mutex<HashSet<u32>>,
    scripts: Mutex<HashMap<JobId, VecDeque<ScriptStep>>>,
    status_calls: Mutex<HashMap<JobId, u32>>,
    submitted: Mutex<Vec<SubmitJobRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th submission (0-based) fail.
    pub fn fail_submission(&self, n: u32) {
        lock(&self.failing_submissions).insert(n);
    }

    pub fn script(&self, job_id: &str, steps: Vec<ScriptStep>) {
        lock(&self.scripts).insert(job_id.to_string(), steps.into());
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        lock(&self.status_calls).get(job_id).copied().unwrap_or(0)
    }

    pub fn submitted_requests(&self) -> Vec<SubmitJobRequest> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobId, EngineError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        lock(&self.submitted).push(request.clone());
        if lock(&self.failing_submissions).contains(&n) {
            return Err(EngineError::ApiError {
                status: 503,
                body: "engine overloaded".to_string(),
            });
        }
        Ok(format!("job-{n}"))
    }

    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, EngineError> {
        *lock(&self.status_calls).entry(job_id.to_string()).or_insert(0) += 1;

        let step = {
            let mut scripts = lock(&self.scripts);
            match scripts.get_mut(job_id) {
                Some(steps) if steps.len() > 1 => steps.pop_front(),
                Some(steps) => steps.front().cloned(),
                None => None,
            }
        };

        match step.unwrap_or_else(ScriptStep::processing) {
            ScriptStep::Status(status, outputs) => Ok(JobStatusResponse {
                error: (status == RemoteStatus::Failed).then(|| "scripted failure".to_string()),
                status,
                outputs,
            }),
            ScriptStep::Error => Err(EngineError::InvalidResponse(
                "scripted transport error".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Archive fake that records every write.
#[derive(Debug, Default)]
pub struct RecordingArchive {
    next_id: AtomicU32,
    creates: Mutex<Vec<ArchiveFields>>,
    updates: Mutex<Vec<(ArchiveRecordId, ArchiveFields)>>,
    fail_creates: Mutex<bool>,
    fail_updates: Mutex<bool>,
}

impl RecordingArchive {
    pub fn fail_creates(&self, fail: bool) {
        *lock(&self.fail_creates) = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        *lock(&self.fail_updates) = fail;
    }

    pub fn creates(&self) -> Vec<ArchiveFields> {
        lock(&self.creates).clone()
    }

    /// Every update attempt, including ones that were made to fail.
    pub fn updates(&self) -> Vec<(ArchiveRecordId, ArchiveFields)> {
        lock(&self.updates).clone()
    }

    /// Updates that wrote the `completed` status.
    pub fn final_updates(&self) -> Vec<(ArchiveRecordId, ArchiveFields)> {
        self.updates()
            .into_iter()
            .filter(|(_, fields)| fields.status == Some(RecordStatus::Completed))
            .collect()
    }

    pub fn final_update_count(&self) -> usize {
        self.final_updates().len()
    }
}

#[async_trait]
impl ArchiveSink for RecordingArchive {
    async fn create(&self, fields: &ArchiveFields) -> Result<ArchiveRecordId, ArchiveError> {
        if *lock(&self.fail_creates) {
            return Err(ArchiveError::HttpStatus {
                status: 500,
                body: "archive down".to_string(),
            });
        }
        lock(&self.creates).push(fields.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("rec-{n}"))
    }

    async fn update(&self, record_id: &str, fields: &ArchiveFields) -> Result<(), ArchiveError> {
        lock(&self.updates).push((record_id.to_string(), fields.clone()));
        if *lock(&self.fail_updates) {
            return Err(ArchiveError::HttpStatus {
                status: 500,
                body: "archive down".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input preparer that returns fixed images, or fails on demand.
#[derive(Debug, Default)]
pub struct StaticInputs {
    fail: Mutex<bool>,
}

impl StaticInputs {
    pub fn failing() -> Self {
        Self {
            fail: Mutex::new(true),
        }
    }
}

#[async_trait]
impl InputPreparer for StaticInputs {
    async fn prepare(
        &self,
        subject_url: &str,
        reference_urls: &[String],
    ) -> Result<PreparedInputs, InputError> {
        if *lock(&self.fail) {
            return Err(InputError::HttpStatus {
                url: subject_url.to_string(),
                status: 404,
            });
        }
        let image = |role| ImageInput {
            role,
            mime_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        };
        Ok(PreparedInputs {
            subject: image(ImageRole::Subject),
            references: reference_urls
                .iter()
                .map(|_| image(ImageRole::Reference))
                .collect(),
        })
    }
}

/// Lock a fake's mutex, recovering the data if a panicking test poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
