//! Tests for `AppError` -> HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router is
//! involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use batchgen_api::error::AppError;
use batchgen_archive::ArchiveError;
use batchgen_core::error::CoreError;
use batchgen_engine::inputs::InputError;
use batchgen_pipeline::registry::RegistryError;
use batchgen_pipeline::submission::SubmissionError;
use batchgen_pipeline::webhook::WebhookError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn registry_not_found_maps_to_404() {
    let err: AppError = RegistryError::JobNotFound("job-9".into()).into();
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id job-9 not found");
}

#[tokio::test]
async fn submission_validation_maps_to_400() {
    let err = AppError::Submission(SubmissionError::Validation(CoreError::Validation(
        "prompt must not be blank".into(),
    )));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "prompt must not be blank");
}

#[tokio::test]
async fn input_preparation_maps_to_422() {
    let err = AppError::Submission(SubmissionError::InputPreparation(InputError::Empty {
        url: "https://img/x.png".into(),
    }));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INPUT_PREPARATION_FAILED");
}

#[tokio::test]
async fn archive_failure_maps_to_502_without_leaking_details() {
    let err = AppError::Submission(SubmissionError::Archive(ArchiveError::HttpStatus {
        status: 500,
        body: "stack trace".into(),
    }));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "ARCHIVE_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("stack trace"));
}

#[tokio::test]
async fn unknown_webhook_job_maps_to_404() {
    let err = AppError::Webhook(WebhookError::UnknownJob("ghost".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "UNKNOWN_JOB");
}

#[tokio::test]
async fn internal_error_is_sanitized() {
    let err = AppError::InternalError("lock poisoned".into());
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
