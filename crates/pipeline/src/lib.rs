//! Batch completion tracking.
//!
//! Accepts a batch of generation requests, follows each job to a terminal
//! outcome, and finalizes the batch exactly once:
//!
//! - [`registry`]: per-batch job and aggregate state with a retention policy.
//! - [`reconciler`]: the only writer of terminal job state and the only
//!   trigger of batch finalization.
//! - [`poller`]: per-job status polling with bounded backoff.
//! - [`supervisor`]: owns every poller task for the process lifetime.
//! - [`webhook`]: maps engine push notifications onto outcomes.
//! - [`submission`]: creates a batch and submits its jobs.

pub mod model;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod retention;
pub mod submission;
pub mod supervisor;
pub mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
