//! Generation engine wire types.
//!
//! The engine accepts a JSON job description on submission and reports
//! progress both through `GET` status queries and through webhook pushes.
//! Both channels share the same status vocabulary, normalised here into
//! [`RemoteStatus`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Role of an input image within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The primary image the generation is anchored on.
    Subject,
    /// A style or content reference.
    Reference,
}

/// One encoded input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    #[serde(rename = "type")]
    pub role: ImageRole,
    /// MIME type of the encoded bytes, e.g. `image/png`.
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// Generation parameters that are the same for every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub num_images: u32,
    pub output_format: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_inference_steps: 30,
            guidance_scale: 7.5,
            num_images: 1,
            output_format: "png".to_string(),
        }
    }
}

/// Body of `POST /v1/jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobRequest {
    pub prompt: String,
    pub images: Vec<ImageInput>,
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub params: GenerationParams,
    /// Where the engine pushes status webhooks for this job.
    pub callback_url: String,
}

/// Response returned by `POST /v1/jobs` after the job was queued.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobResponse {
    /// Engine-assigned identifier for the queued job.
    #[serde(alias = "id")]
    pub job_id: String,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Remote job status as reported by the engine.
///
/// The engine is not consistent in its spelling (`succeeded` vs
/// `completed`, `canceled` vs `cancelled`), so raw strings are normalised
/// via [`RemoteStatus::parse`]. Unrecognised values map to
/// [`RemoteStatus::Unknown`], which is treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RemoteStatus {
    Created,
    Processing,
    Completed,
    Failed,
    Unknown(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "queued" | "pending" | "submitted" => Self::Created,
            "processing" | "running" | "in_progress" | "starting" => Self::Processing,
            "completed" | "succeeded" | "success" => Self::Completed,
            "failed" | "error" | "cancelled" | "canceled" => Self::Failed,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<String> for RemoteStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

/// Response of `GET /v1/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: RemoteStatus,
    /// Output references (URLs); only populated once completed.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Engine-provided failure description.
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Payload pushed by the engine to the callback URL.
///
/// Every field is optional at the wire level; the ingest layer decides
/// whether the payload is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, alias = "id")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "output")]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}
