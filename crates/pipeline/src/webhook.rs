//! Webhook ingest.
//!
//! Translates an engine push into a reconciler report. Payloads for jobs
//! the registry does not know are rejected without touching any state;
//! non-terminal statuses are acknowledged and ignored.

use std::sync::Arc;

use batchgen_core::types::BatchId;
use batchgen_engine::messages::{RemoteStatus, WebhookPayload};
use serde::Serialize;

use crate::model::{FailureReason, Outcome};
use crate::reconciler::{ReconcileError, ReportResult, Reconciler};

/// How a webhook was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookAck {
    /// The payload transitioned its job.
    Applied { batch_id: BatchId, finalized: bool },
    /// The job was already terminal.
    Duplicate,
    /// The status is not terminal; nothing to do.
    Ignored { status: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook payload has no job id")]
    MissingJobId,

    #[error("Webhook payload has no status")]
    MissingStatus,

    #[error("Unknown job {0}")]
    UnknownJob(String),
}

pub struct WebhookIngest {
    reconciler: Arc<Reconciler>,
}

impl WebhookIngest {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub async fn handle(&self, payload: WebhookPayload) -> Result<WebhookAck, WebhookError> {
        let job_id = payload
            .job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(WebhookError::MissingJobId)?;
        let raw_status = payload.status.ok_or(WebhookError::MissingStatus)?;

        if self.reconciler.registry().get_job(&job_id).await.is_err() {
            tracing::warn!(job_id = %job_id, status = %raw_status, "Webhook for unknown job");
            return Err(WebhookError::UnknownJob(job_id));
        }

        let outcome = match RemoteStatus::parse(&raw_status) {
            RemoteStatus::Completed if !payload.outputs.is_empty() => Outcome::Completed {
                outputs: payload.outputs,
            },
            RemoteStatus::Completed => Outcome::Failed(FailureReason::Remote(Some(
                "completed without outputs".to_string(),
            ))),
            RemoteStatus::Failed => Outcome::Failed(FailureReason::Remote(payload.error)),
            _ => {
                tracing::debug!(job_id = %job_id, status = %raw_status, "Non-terminal webhook ignored");
                return Ok(WebhookAck::Ignored { status: raw_status });
            }
        };

        tracing::info!(job_id = %job_id, status = %raw_status, "Webhook received");

        match self.reconciler.report_outcome(&job_id, outcome).await {
            Ok(ReportResult::Applied {
                batch_id,
                finalized,
            }) => Ok(WebhookAck::Applied {
                batch_id,
                finalized,
            }),
            Ok(ReportResult::AlreadyTerminal) => Ok(WebhookAck::Duplicate),
            // Evicted between the lookup and the report.
            Err(ReconcileError::UnknownJob(id)) => Err(WebhookError::UnknownJob(id)),
            Err(ReconcileError::UnknownBatch(_) | ReconcileError::BatchFull { .. }) => {
                Err(WebhookError::UnknownJob(job_id))
            }
        }
    }
}
