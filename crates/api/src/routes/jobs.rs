use axum::routing::get;
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(batches::get_job))
}
