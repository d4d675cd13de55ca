//! Batch submission.
//!
//! [`SubmissionPipeline::submit_batch`] turns a validated request into a
//! registered batch: inputs are prepared once, the archive record is
//! created before anything reaches the engine, and a supervised task then
//! submits every unit in order with a fixed spacing between submissions.
//! A unit the engine rejects degrades to a failed entry; only validation,
//! input preparation and archive creation failures abort the request.

use std::sync::Arc;
use std::time::Duration;

use batchgen_archive::{ArchiveError, ArchiveFields, ArchiveSink, RecordStatus};
use batchgen_core::batch_request::{validate_batch_request, BatchRequest};
use batchgen_core::error::CoreError;
use batchgen_core::types::{ArchiveRecordId, BatchId};
use batchgen_engine::api::GenerationEngine;
use batchgen_engine::inputs::{InputError, InputPreparer, PreparedInputs};
use batchgen_engine::messages::{GenerationParams, SubmitJobRequest};
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::model::{Batch, Job};
use crate::reconciler::Reconciler;
use crate::registry::{Registry, RegistryError};
use crate::supervisor::PollerSupervisor;

/// Default spacing between two submissions to the engine.
const DEFAULT_SUBMIT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    /// Minimum time between two consecutive engine submissions.
    pub submit_delay: Duration,
    /// Webhook address handed to the engine with every job.
    pub callback_url: String,
    pub params: GenerationParams,
}

impl SubmissionConfig {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            submit_delay: DEFAULT_SUBMIT_DELAY,
            callback_url: callback_url.into(),
            params: GenerationParams::default(),
        }
    }
}

/// Errors that abort a whole batch request.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Input preparation failed: {0}")]
    InputPreparation(#[from] InputError),

    #[error("Archive record could not be created: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What the caller gets back once the batch exists. Unit submission
/// continues in the background.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReceipt {
    pub batch_id: BatchId,
    pub archive_record_id: ArchiveRecordId,
    pub requested: u32,
}

pub struct SubmissionPipeline {
    engine: Arc<dyn GenerationEngine>,
    inputs: Arc<dyn InputPreparer>,
    archive: Arc<dyn ArchiveSink>,
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
    supervisor: Arc<PollerSupervisor>,
    config: SubmissionConfig,
}

impl SubmissionPipeline {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        inputs: Arc<dyn InputPreparer>,
        archive: Arc<dyn ArchiveSink>,
        reconciler: Arc<Reconciler>,
        supervisor: Arc<PollerSupervisor>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            engine,
            inputs,
            archive,
            registry: Arc::clone(reconciler.registry()),
            reconciler,
            supervisor,
            config,
        }
    }

    /// Create a batch and start submitting its units.
    ///
    /// Returns as soon as the archive record and the registry entry exist.
    /// The units are submitted by a supervised background task, so a caller
    /// that goes away mid-request cannot strand a half-submitted batch.
    pub async fn submit_batch(
        self: &Arc<Self>,
        request: BatchRequest,
    ) -> Result<BatchReceipt, SubmissionError> {
        validate_batch_request(&request)?;

        let inputs = self
            .inputs
            .prepare(&request.subject_image_url, &request.reference_image_urls)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Input preparation failed, batch aborted");
                e
            })?;

        let batch_id = uuid::Uuid::now_v7();
        let now = Utc::now();
        let size = request.size_label();

        let record_id = self
            .archive
            .create(&ArchiveFields {
                prompt: Some(request.prompt.clone()),
                size: Some(size.clone()),
                status: Some(RecordStatus::Submitting),
                run_id: Some(batch_id.to_string()),
                requested_jobs: Some(request.job_count),
                created_at: Some(now),
                ..Default::default()
            })
            .await?;

        self.registry
            .create_batch(Batch::new(
                batch_id,
                record_id.clone(),
                request.prompt.clone(),
                size,
                request.job_count,
                now,
            ))
            .await?;

        tracing::info!(
            %batch_id,
            archive_record_id = %record_id,
            requested = request.job_count,
            "Batch created"
        );

        let receipt = BatchReceipt {
            batch_id,
            archive_record_id: record_id,
            requested: request.job_count,
        };

        let pipeline = Arc::clone(self);
        self.supervisor.spawn_submission(batch_id, move |cancel| async move {
            pipeline.submit_units(batch_id, request, inputs, cancel).await;
        });

        Ok(receipt)
    }

    // ---- private helpers ----

    /// Submit every unit in order, spaced by `submit_delay`. On cancellation
    /// the units not yet handed to the engine are recorded as submission
    /// failures so the batch can still finalize.
    async fn submit_units(
        &self,
        batch_id: BatchId,
        request: BatchRequest,
        inputs: PreparedInputs,
        cancel: CancellationToken,
    ) {
        let mut submitted = 0;
        for unit in 0..request.job_count {
            if unit > 0 {
                tokio::select! {
                    () = tokio::time::sleep(self.config.submit_delay) => {}
                    () = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                tracing::warn!(
                    %batch_id,
                    remaining = request.job_count - unit,
                    "Submission cancelled, settling remaining units"
                );
                for pending in unit..request.job_count {
                    let reason = "cancelled before submission".to_string();
                    self.record_failure(batch_id, pending, reason).await;
                }
                break;
            }
            if self.submit_unit(batch_id, unit, &request, &inputs).await {
                submitted += 1;
            }
        }

        tracing::info!(
            %batch_id,
            submitted,
            requested = request.job_count,
            "Batch submission finished"
        );
    }

    /// Submit one unit. Returns `true` if the engine accepted it and a
    /// poller is now following it.
    async fn submit_unit(
        &self,
        batch_id: BatchId,
        unit: u32,
        request: &BatchRequest,
        inputs: &PreparedInputs,
    ) -> bool {
        let job_request = SubmitJobRequest {
            prompt: request.prompt.clone(),
            images: inputs.to_images(),
            width: request.width,
            height: request.height,
            params: self.config.params.clone(),
            callback_url: self.config.callback_url.clone(),
        };

        let failure = match self.engine.submit(&job_request).await {
            Ok(job_id) => {
                match self
                    .registry
                    .create_job(Job::new(job_id.clone(), batch_id, unit, Utc::now()))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(%batch_id, unit, job_id = %job_id, "Job submitted");
                        self.supervisor.spawn(job_id);
                        if let Err(e) = self.reconciler.sync_progress(batch_id).await {
                            tracing::warn!(%batch_id, error = %e, "Progress sync skipped");
                        }
                        return true;
                    }
                    Err(e) => e.to_string(),
                }
            }
            Err(e) => e.to_string(),
        };

        self.record_failure(batch_id, unit, failure).await;
        false
    }

    async fn record_failure(&self, batch_id: BatchId, unit: u32, message: String) {
        if let Err(e) = self
            .reconciler
            .record_submission_failure(batch_id, unit, message)
            .await
        {
            tracing::error!(%batch_id, unit, error = %e, "Could not record submission failure");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
