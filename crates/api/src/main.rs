use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use batchgen_archive::HttpArchive;
use batchgen_engine::api::EngineApi;
use batchgen_engine::inputs::HttpImageFetcher;
use batchgen_pipeline::retention;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batchgen_api::config::ServerConfig;
use batchgen_api::router::build_app_router;
use batchgen_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "batchgen_api=debug,batchgen_pipeline=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        engine = %config.engine.api_url,
        archive = %config.archive.api_url,
        callback = %config.callback_url(),
        "Loaded server configuration"
    );

    // --- External collaborators ---
    let engine = Arc::new(EngineApi::new(config.engine.clone()).expect("Failed to build engine client"));
    let archive =
        Arc::new(HttpArchive::new(config.archive.clone()).expect("Failed to build archive client"));
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build image fetch client");
    let inputs = Arc::new(HttpImageFetcher::new(http));

    // --- App state ---
    let state = AppState::assemble(config.clone(), engine, inputs, archive);
    let supervisor = Arc::clone(&state.supervisor);

    // --- Retention sweeper ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(retention::run(
        Arc::clone(&state.registry),
        retention_cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Pollers may have in-flight status queries; give them the grace period.
    supervisor
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    retention_cancel.cancel();
    match tokio::time::timeout(Duration::from_secs(5), retention_handle).await {
        Ok(Ok(())) => tracing::info!("Retention job stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Retention job failed"),
        Err(_) => tracing::warn!("Retention job did not stop in time"),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
