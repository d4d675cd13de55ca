//! REST client for the generation engine.
//!
//! [`GenerationEngine`] is the seam the submission pipeline and the status
//! poller talk to; [`EngineApi`] implements it over HTTP using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use batchgen_core::types::JobId;

use crate::messages::{JobStatusResponse, SubmitJobRequest, SubmitJobResponse};

/// HTTP request timeout for a single engine call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the generation engine layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The engine accepted the call but the response was unusable.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

/// Submission and status queries against the generation engine.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Queue one job and return the engine-assigned job id.
    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobId, EngineError>;

    /// Query the current remote status of a job.
    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, EngineError>;
}

/// Connection settings for [`EngineApi`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base HTTP URL, e.g. `https://engine.example.com`.
    pub api_url: String,
    /// Bearer token sent on every request, if set.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client for the generation engine.
pub struct EngineApi {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl EngineApi {
    /// Create a new API client with its own connection pool.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: EngineConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`EngineError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl GenerationEngine for EngineApi {
    /// Sends `POST /v1/jobs`.
    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobId, EngineError> {
        let response = self
            .authorize(self.client.post(format!("{}/v1/jobs", self.api_url)))
            .json(request)
            .send()
            .await?;

        let parsed: SubmitJobResponse = Self::parse_response(response).await?;
        if parsed.job_id.trim().is_empty() {
            return Err(EngineError::InvalidResponse(
                "empty job id in submit response".to_string(),
            ));
        }

        tracing::debug!(job_id = %parsed.job_id, "Job accepted by generation engine");
        Ok(parsed.job_id)
    }

    /// Sends `GET /v1/jobs/{id}`.
    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, EngineError> {
        let response = self
            .authorize(self.client.get(format!("{}/v1/jobs/{}", self.api_url, job_id)))
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
