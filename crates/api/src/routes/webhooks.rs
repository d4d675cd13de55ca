//! Route definitions for inbound engine webhooks.
//!
//! Unauthenticated: the engine posts here using the callback address it was
//! given at submission time.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// POST   /engine          -> engine_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/engine", post(webhooks::engine_status))
}
