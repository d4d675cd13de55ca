//! Request handlers.
//!
//! Handlers delegate to the pipeline held in [`AppState`](crate::state::AppState)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod batches;
pub mod webhooks;
