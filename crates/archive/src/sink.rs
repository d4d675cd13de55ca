//! Archive writes with exponential-backoff retry.
//!
//! [`HttpArchive`] posts records to a REST archive backend
//! (`POST /records`, `PATCH /records/{id}`). Failed writes are retried
//! with exponential backoff (1 s, 2 s, 4 s by default) before the error is
//! returned to the caller.

use std::time::Duration;

use async_trait::async_trait;
use batchgen_core::backoff::{next_delay, BackoffConfig};
use batchgen_core::types::ArchiveRecordId;
use serde::Deserialize;

use crate::record::ArchiveFields;

/// Retries after the first failed attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP request timeout for a single write attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for archive write failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The archive backend returned a non-2xx status code.
    #[error("Archive returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The backend accepted the write but the response was unusable.
    #[error("Invalid archive response: {0}")]
    InvalidResponse(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Create/update access to the external archive.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Create a record and return its id.
    async fn create(&self, fields: &ArchiveFields) -> Result<ArchiveRecordId, ArchiveError>;

    /// Overwrite the given fields of an existing record.
    async fn update(&self, record_id: &str, fields: &ArchiveFields) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// HttpArchive
// ---------------------------------------------------------------------------

/// Connection and retry settings for [`HttpArchive`].
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base HTTP URL of the archive table, e.g. `https://archive/v0/base/table`.
    pub api_url: String,
    /// Bearer token sent on every request, if set.
    pub api_key: Option<String>,
    pub retry: BackoffConfig,
    pub max_retries: u32,
}

impl ArchiveConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: None,
            retry: BackoffConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
                multiplier: 2.0,
            },
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// REST archive client.
pub struct HttpArchive {
    client: reqwest::Client,
    config: ArchiveConfig,
}

impl HttpArchive {
    pub fn new(config: ArchiveConfig) -> Result<Self, ArchiveError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn records_url(&self) -> String {
        format!("{}/records", self.config.api_url.trim_end_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Run `attempt` until it succeeds or the retry budget is spent.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, ArchiveError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ArchiveError>>,
    {
        let mut delay = self.config.retry.initial_delay;
        let mut tries = 0u32;

        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if tries > self.config.max_retries => {
                    tracing::error!(operation, attempts = tries, error = %e, "Archive write failed after all retries");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Archive write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.config.retry);
                }
            }
        }
    }

    async fn try_create(&self, fields: &ArchiveFields) -> Result<ArchiveRecordId, ArchiveError> {
        let body = serde_json::json!({ "fields": fields });
        let response = self
            .authorize(self.client.post(self.records_url()))
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let created: CreateResponse = response.json().await?;
        if created.id.is_empty() {
            return Err(ArchiveError::InvalidResponse(
                "empty record id".to_string(),
            ));
        }
        Ok(created.id)
    }

    async fn try_update(&self, record_id: &str, fields: &ArchiveFields) -> Result<(), ArchiveError> {
        let body = serde_json::json!({ "fields": fields });
        let response = self
            .authorize(
                self.client
                    .patch(format!("{}/{}", self.records_url(), record_id)),
            )
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for HttpArchive {
    async fn create(&self, fields: &ArchiveFields) -> Result<ArchiveRecordId, ArchiveError> {
        self.with_retry("create", || self.try_create(fields)).await
    }

    async fn update(&self, record_id: &str, fields: &ArchiveFields) -> Result<(), ArchiveError> {
        self.with_retry("update", || self.try_update(record_id, fields))
            .await
    }
}

/// Map a non-2xx response to [`ArchiveError::HttpStatus`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ArchiveError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ArchiveError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
