//! Input preparation: fetch source images and encode them for submission.
//!
//! All images of a batch are prepared up front. A single failure aborts the
//! whole batch before anything is submitted, so callers get every input or
//! an [`InputError`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::messages::{ImageInput, ImageRole};

/// MIME type assumed when the image host does not send a usable
/// `Content-Type` header.
const FALLBACK_MIME_TYPE: &str = "image/png";

/// Errors raised while preparing submission inputs.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The image could not be downloaded.
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The image host answered with a non-2xx status.
    #[error("Fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The image host returned zero bytes.
    #[error("Image at {url} is empty")]
    Empty { url: String },
}

/// The encoded images shared by every job of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInputs {
    pub subject: ImageInput,
    pub references: Vec<ImageInput>,
}

impl PreparedInputs {
    /// Subject first, then references in request order.
    pub fn to_images(&self) -> Vec<ImageInput> {
        std::iter::once(self.subject.clone())
            .chain(self.references.iter().cloned())
            .collect()
    }
}

/// Turns image URLs into encoded submission payloads.
#[async_trait]
pub trait InputPreparer: Send + Sync {
    async fn prepare(
        &self,
        subject_url: &str,
        reference_urls: &[String],
    ) -> Result<PreparedInputs, InputError>;
}

/// [`InputPreparer`] that downloads each image over HTTP and base64-encodes it.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str, role: ImageRole) -> Result<ImageInput, InputError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| InputError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InputError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalize_mime_type)
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        let bytes = response.bytes().await.map_err(|source| InputError::Fetch {
            url: url.to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(InputError::Empty {
                url: url.to_string(),
            });
        }

        tracing::debug!(url, size = bytes.len(), %mime_type, "Fetched input image");

        Ok(ImageInput {
            role,
            mime_type,
            data: STANDARD.encode(&bytes),
        })
    }
}

#[async_trait]
impl InputPreparer for HttpImageFetcher {
    async fn prepare(
        &self,
        subject_url: &str,
        reference_urls: &[String],
    ) -> Result<PreparedInputs, InputError> {
        let subject = self.fetch(subject_url, ImageRole::Subject).await?;

        let mut references = Vec::with_capacity(reference_urls.len());
        for url in reference_urls {
            references.push(self.fetch(url, ImageRole::Reference).await?);
        }

        Ok(PreparedInputs {
            subject,
            references,
        })
    }
}

/// Strip parameters (`; charset=...`) and fall back for non-image types.
fn normalize_mime_type(raw: &str) -> String {
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if essence.starts_with("image/") {
        essence
    } else {
        FALLBACK_MIME_TYPE.to_string()
    }
}
