//! Handlers for the `/batches` and `/jobs` resources.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use batchgen_core::batch_request::BatchRequest;
use batchgen_core::types::BatchId;
use batchgen_pipeline::model::{BatchSnapshot, Job};
use batchgen_pipeline::submission::BatchReceipt;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/batches
///
/// Responds once the batch and its archive record exist; units are
/// submitted and tracked in the background, observable through
/// `GET /batches/{id}`.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<BatchReceipt>>)> {
    let receipt = state.pipeline.submit_batch(input).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: receipt })))
}

/// GET /api/v1/batches/{id}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> AppResult<Json<DataResponse<BatchSnapshot>>> {
    let snapshot = state.registry.get_batch(id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.registry.get_job(&id).await?;
    Ok(Json(DataResponse { data: job }))
}
