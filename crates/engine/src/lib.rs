//! Generation engine client library.
//!
//! Provides the typed wire format of the asynchronous image-generation
//! service, the [`GenerationEngine`](api::GenerationEngine) seam with its
//! HTTP implementation, and input preparation (fetching source images and
//! encoding them for submission).

pub mod api;
pub mod inputs;
pub mod messages;
