pub mod batches;
pub mod health;
pub mod jobs;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /batches                 submit a batch (POST)
/// /batches/{id}            batch snapshot (GET)
///
/// /jobs/{id}               job record (GET)
///
/// /webhooks/engine         engine status push (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/batches", batches::router())
        .nest("/jobs", jobs::router())
        .nest("/webhooks", webhooks::router())
}
