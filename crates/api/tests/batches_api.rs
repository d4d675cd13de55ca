//! Integration tests for batch submission and status endpoints.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use batchgen_pipeline::testing::{ScriptStep, StaticInputs};
use common::{body_json, get, post_json};
use serde_json::json;

fn batch_body(job_count: u32) -> serde_json::Value {
    json!({
        "prompt": "a red fox in fresh snow",
        "subject_image_url": "https://img.example.com/fox.png",
        "reference_image_urls": ["https://img.example.com/snow.png"],
        "width": 1024,
        "height": 1024,
        "job_count": job_count,
    })
}

#[tokio::test]
async fn submit_batch_then_poll_to_completion() {
    let app = common::build_test_app();
    app.engine.script("job-0", vec![ScriptStep::completed("https://cdn/0.png")]);
    app.engine.script(
        "job-1",
        vec![ScriptStep::processing(), ScriptStep::completed("https://cdn/1.png")],
    );

    let response = post_json(app.router.clone(), "/api/v1/batches", batch_body(2)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["data"]["requested"], 2);
    assert_eq!(json["data"]["archive_record_id"], "rec-1");
    let batch_id = json["data"]["batch_id"].as_str().unwrap().to_string();

    app.state.supervisor.wait_idle().await;

    let response = get(app.router.clone(), &format!("/api/v1/batches/{batch_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["status"], "completed");
    assert_eq!(data["finalized"], true);
    assert_eq!(data["all_failed"], false);
    assert_eq!(data["seen_ids"].as_array().unwrap().len(), 2);
    assert_eq!(data["outputs"].as_array().unwrap().len(), 2);
    assert!(data["completed_at"].is_string());

    assert_eq!(app.archive.final_update_count(), 1);
}

#[tokio::test]
async fn slow_submission_outlives_request_timeout() {
    let mut config = common::test_config();
    config.request_timeout_secs = 1;
    config.submit_delay = Duration::from_millis(700);
    let app = common::build_test_app_from(config, StaticInputs::default());
    for i in 0..3 {
        let output = format!("https://cdn/{i}.png");
        app.engine
            .script(&format!("job-{i}"), vec![ScriptStep::completed(&output)]);
    }

    let response = post_json(app.router.clone(), "/api/v1/batches", batch_body(3)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    let batch_id = json["data"]["batch_id"].as_str().unwrap().to_string();

    app.state.supervisor.wait_idle().await;

    let response = get(app.router.clone(), &format!("/api/v1/batches/{batch_id}")).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["seen_ids"].as_array().unwrap().len(), 3);
    assert_eq!(json["data"]["failed"], 0);
    assert_eq!(app.engine.submitted_requests().len(), 3);
    assert_eq!(app.archive.final_update_count(), 1);
}

#[tokio::test]
async fn job_endpoint_reports_status_and_retries() {
    let app = common::build_test_app();
    app.engine.script("job-0", vec![ScriptStep::failed()]);

    post_json(app.router.clone(), "/api/v1/batches", batch_body(1)).await;
    app.state.supervisor.wait_idle().await;

    let response = get(app.router.clone(), "/api/v1/jobs/job-0").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["retries"], 1);
    assert_eq!(json["data"]["failure"]["kind"], "remote");
}

#[tokio::test]
async fn invalid_batch_returns_400() {
    let app = common::build_test_app();
    let response = post_json(app.router.clone(), "/api/v1/batches", batch_body(0)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.archive.creates().is_empty());
}

#[tokio::test]
async fn input_preparation_failure_returns_422() {
    let app = common::build_test_app_with(StaticInputs::failing());
    let response = post_json(app.router.clone(), "/api/v1/batches", batch_body(2)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INPUT_PREPARATION_FAILED");
    assert!(app.engine.submitted_requests().is_empty());
}

#[tokio::test]
async fn archive_failure_returns_502() {
    let app = common::build_test_app();
    app.archive.fail_creates(true);

    let response = post_json(app.router.clone(), "/api/v1/batches", batch_body(2)).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "ARCHIVE_UNAVAILABLE");
    assert!(app.engine.submitted_requests().is_empty());
}

#[tokio::test]
async fn unknown_batch_returns_404() {
    let app = common::build_test_app();
    let response = get(
        app.router.clone(),
        "/api/v1/batches/0190b3c2-7e4a-7000-8000-000000000000",
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_batch_id_is_rejected() {
    let app = common::build_test_app();
    let response = get(app.router.clone(), "/api/v1/batches/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
