use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use batchgen_core::error::CoreError;
use batchgen_pipeline::registry::RegistryError;
use batchgen_pipeline::submission::SubmissionError;
use batchgen_pipeline::webhook::WebhookError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and the pipeline's request-level
/// errors. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `batchgen_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A batch request that was aborted before or during creation.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// A webhook that could not be applied.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Core(err.into())
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            // --- Submission errors ---
            AppError::Submission(err) => match err {
                SubmissionError::Validation(core) => classify_core_error(core),
                SubmissionError::InputPreparation(e) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INPUT_PREPARATION_FAILED",
                    e.to_string(),
                ),
                SubmissionError::Archive(e) => {
                    tracing::error!(error = %e, "Archive unavailable, batch aborted");
                    (
                        StatusCode::BAD_GATEWAY,
                        "ARCHIVE_UNAVAILABLE",
                        "The archive could not record the batch".to_string(),
                    )
                }
                SubmissionError::Registry(e) => internal_error(&e.to_string()),
            },

            // --- Webhook errors ---
            AppError::Webhook(err) => match err {
                WebhookError::UnknownJob(id) => (
                    StatusCode::NOT_FOUND,
                    "UNKNOWN_JOB",
                    format!("Job {id} is not tracked"),
                ),
                WebhookError::MissingJobId | WebhookError::MissingStatus => {
                    (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK", err.to_string())
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal_error(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Internal(msg) => internal_error(msg),
    }
}

fn internal_error(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
