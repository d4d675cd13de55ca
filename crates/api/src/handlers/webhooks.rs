use axum::extract::State;
use axum::Json;
use batchgen_engine::messages::WebhookPayload;
use batchgen_pipeline::webhook::WebhookAck;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/webhooks/engine
///
/// Duplicate and non-terminal deliveries are acknowledged with 200 so the
/// engine does not retry them; unknown job ids get a 404.
pub async fn engine_status(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> AppResult<Json<DataResponse<WebhookAck>>> {
    let ack = state.webhook.handle(payload).await?;
    Ok(Json(DataResponse { data: ack }))
}
