//! Shared domain types for the batch generation service.
//!
//! Holds the error taxonomy, identifier aliases, and the validation rules
//! applied to incoming batch requests. Has no internal dependencies so
//! every other crate in the workspace can use it.

pub mod backoff;
pub mod batch_request;
pub mod error;
pub mod types;
