#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use batchgen_core::backoff::BackoffConfig;
use batchgen_pipeline::poller::PollConfig;
use batchgen_pipeline::testing::{RecordingArchive, ScriptedEngine, StaticInputs};
use http_body_util::BodyExt;
use tower::ServiceExt;

use batchgen_api::config::ServerConfig;
use batchgen_api::router::build_app_router;
use batchgen_api::state::AppState;

/// Fakes behind the router, kept so tests can script and inspect them.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub engine: Arc<ScriptedEngine>,
    pub archive: Arc<RecordingArchive>,
}

/// Build a test `ServerConfig` with defaults plus fast polling and no
/// submission spacing.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::from_lookup(|_| None).unwrap();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.request_timeout_secs = 30;
    config.submit_delay = Duration::ZERO;
    config.poll = PollConfig {
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            multiplier: 1.5,
        },
        max_attempts: 5,
    };
    config
}

/// Build the full application router over in-memory collaborators.
///
/// Uses the same `AppState::assemble` and `build_app_router` as `main.rs`,
/// so integration tests exercise the production wiring and middleware.
pub fn build_test_app() -> TestApp {
    build_test_app_with(StaticInputs::default())
}

pub fn build_test_app_with(inputs: StaticInputs) -> TestApp {
    build_test_app_from(test_config(), inputs)
}

/// Variant with pollers that wait far longer than any test runs, so job
/// state only changes through the webhook endpoint.
pub fn build_webhook_test_app() -> TestApp {
    let mut config = test_config();
    config.poll.backoff.initial_delay = Duration::from_secs(600);
    config.poll.backoff.max_delay = Duration::from_secs(600);
    build_test_app_from(config, StaticInputs::default())
}

pub fn build_test_app_from(config: ServerConfig, inputs: StaticInputs) -> TestApp {
    let engine = Arc::new(ScriptedEngine::new());
    let archive = Arc::new(RecordingArchive::default());
    let state = AppState::assemble(
        config,
        engine.clone(),
        Arc::new(inputs),
        archive.clone(),
    );
    TestApp {
        router: build_app_router(state.clone()),
        state,
        engine,
        archive,
    }
}

/// Wait until the background submission loop has registered `job_id`.
pub async fn wait_for_job(app: &TestApp, job_id: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while app.state.registry.get_job(job_id).await.is_err() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("job was never registered");
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
