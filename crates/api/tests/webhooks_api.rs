//! Integration tests for the engine webhook endpoint.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json};
use serde_json::json;

const WEBHOOK: &str = "/api/v1/webhooks/engine";

async fn submit_one(app: &common::TestApp) -> String {
    let response = post_json(
        app.router.clone(),
        "/api/v1/batches",
        json!({
            "prompt": "harbour at night",
            "subject_image_url": "https://img.example.com/harbour.png",
            "width": 512,
            "height": 512,
            "job_count": 1,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    common::wait_for_job(app, "job-0").await;
    json["data"]["batch_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn webhook_for_unknown_job_returns_404() {
    let app = common::build_webhook_test_app();
    let response = post_json(
        app.router.clone(),
        WEBHOOK,
        json!({ "job_id": "never-submitted", "status": "completed", "outputs": ["x.png"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNKNOWN_JOB");
    assert!(app.archive.updates().is_empty());
}

#[tokio::test]
async fn webhook_finalizes_batch_and_duplicates_are_acknowledged() {
    let app = common::build_webhook_test_app();
    let batch_id = submit_one(&app).await;

    let response = post_json(
        app.router.clone(),
        WEBHOOK,
        json!({ "id": "job-0", "status": "succeeded", "output": ["https://cdn/0.png"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "applied");
    assert_eq!(json["data"]["finalized"], true);
    assert_eq!(json["data"]["batch_id"], batch_id.as_str());

    let response = post_json(
        app.router.clone(),
        WEBHOOK,
        json!({ "job_id": "job-0", "status": "failed", "error": "late" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "duplicate");

    let response = get(app.router.clone(), &format!("/api/v1/batches/{batch_id}")).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["failed"], 0);
    assert_eq!(json["data"]["outputs"], json!(["https://cdn/0.png"]));
    assert_eq!(app.archive.final_update_count(), 1);
}

#[tokio::test]
async fn non_terminal_webhook_is_ignored() {
    let app = common::build_webhook_test_app();
    submit_one(&app).await;

    let response = post_json(
        app.router.clone(),
        WEBHOOK,
        json!({ "job_id": "job-0", "status": "running" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["result"], "ignored");
    assert_eq!(json["data"]["status"], "running");

    let response = get(app.router.clone(), "/api/v1/jobs/job-0").await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "submitted");
}

#[tokio::test]
async fn webhook_without_job_id_returns_400() {
    let app = common::build_webhook_test_app();
    let response = post_json(app.router.clone(), WEBHOOK, json!({ "status": "completed" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_WEBHOOK");
}
