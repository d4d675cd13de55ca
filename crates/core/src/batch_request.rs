//! Batch request shape, limits, and validation.
//!
//! A [`BatchRequest`] is rejected here, before any input is fetched or any
//! archive record is created, so a malformed request never has side effects.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateUrl, ValidationError};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of jobs a single batch may request.
pub const MAX_JOBS_PER_BATCH: u32 = 20;
/// Maximum number of reference images besides the subject.
pub const MAX_REFERENCE_IMAGES: usize = 8;
/// Smallest accepted output edge in pixels.
pub const MIN_DIMENSION: u32 = 256;
/// Largest accepted output edge in pixels.
pub const MAX_DIMENSION: u32 = 4096;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One user-submitted generation request.
///
/// `job_count` independent jobs are submitted with the same prompt and
/// images; each job yields its own outputs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchRequest {
    #[validate(length(min = 1, max = 4000, message = "prompt must be 1-4000 characters"))]
    pub prompt: String,

    /// Primary image the generation is anchored on.
    #[validate(url(message = "subject_image_url must be a valid URL"))]
    pub subject_image_url: String,

    /// Additional style/content reference images.
    #[serde(default)]
    #[validate(custom(function = "validate_reference_urls"))]
    pub reference_image_urls: Vec<String>,

    #[validate(range(min = 256, max = 4096, message = "width must be 256-4096"))]
    pub width: u32,

    #[validate(range(min = 256, max = 4096, message = "height must be 256-4096"))]
    pub height: u32,

    #[validate(range(min = 1, max = 20, message = "job_count must be 1-20"))]
    pub job_count: u32,
}

impl BatchRequest {
    /// `"{width}x{height}"`, the size label stored in the archive.
    pub fn size_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[allow(clippy::ptr_arg)]
fn validate_reference_urls(urls: &Vec<String>) -> Result<(), ValidationError> {
    if urls.len() > MAX_REFERENCE_IMAGES {
        let mut err = ValidationError::new("too_many_references");
        err.message = Some(format!("at most {MAX_REFERENCE_IMAGES} reference images").into());
        return Err(err);
    }
    if urls.iter().any(|u| !u.validate_url()) {
        let mut err = ValidationError::new("invalid_reference_url");
        err.message = Some("every reference image must be a valid URL".into());
        return Err(err);
    }
    Ok(())
}

/// Validate a batch request, flattening field errors into one
/// [`CoreError::Validation`] message.
pub fn validate_batch_request(request: &BatchRequest) -> Result<(), CoreError> {
    request
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "prompt must not be blank".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BatchRequest {
        BatchRequest {
            prompt: "a red fox in fresh snow".to_string(),
            subject_image_url: "https://cdn.example.com/fox.png".to_string(),
            reference_image_urls: vec!["https://cdn.example.com/style.jpg".to_string()],
            width: 1024,
            height: 768,
            job_count: 3,
        }
    }

    #[test]
    fn accepts_valid_request() {
        assert!(validate_batch_request(&valid()).is_ok());
    }

    #[test]
    fn rejects_blank_prompt() {
        let mut req = valid();
        req.prompt = "   ".to_string();
        assert!(matches!(
            validate_batch_request(&req),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn rejects_zero_jobs() {
        let mut req = valid();
        req.job_count = 0;
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn rejects_too_many_jobs() {
        let mut req = valid();
        req.job_count = MAX_JOBS_PER_BATCH + 1;
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn rejects_out_of_range_dimensions() {
        let mut req = valid();
        req.width = MIN_DIMENSION - 1;
        assert!(validate_batch_request(&req).is_err());

        let mut req = valid();
        req.height = MAX_DIMENSION + 1;
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn rejects_bad_subject_url() {
        let mut req = valid();
        req.subject_image_url = "not a url".to_string();
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn rejects_bad_reference_url() {
        let mut req = valid();
        req.reference_image_urls.push("nope".to_string());
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn rejects_too_many_references() {
        let mut req = valid();
        req.reference_image_urls =
            vec!["https://cdn.example.com/r.png".to_string(); MAX_REFERENCE_IMAGES + 1];
        assert!(validate_batch_request(&req).is_err());
    }

    #[test]
    fn size_label_formats_dimensions() {
        assert_eq!(valid().size_label(), "1024x768");
    }
}
