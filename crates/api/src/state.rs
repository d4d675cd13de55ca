use std::sync::Arc;

use batchgen_archive::ArchiveSink;
use batchgen_engine::api::GenerationEngine;
use batchgen_engine::inputs::InputPreparer;
use batchgen_pipeline::poller::Poller;
use batchgen_pipeline::reconciler::Reconciler;
use batchgen_pipeline::registry::Registry;
use batchgen_pipeline::submission::SubmissionPipeline;
use batchgen_pipeline::supervisor::PollerSupervisor;
use batchgen_pipeline::webhook::WebhookIngest;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Batch and job records.
    pub registry: Arc<Registry>,
    pub pipeline: Arc<SubmissionPipeline>,
    pub webhook: Arc<WebhookIngest>,
    /// Owner of every running poller.
    pub supervisor: Arc<PollerSupervisor>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire the pipeline together around the given external collaborators.
    pub fn assemble(
        config: ServerConfig,
        engine: Arc<dyn GenerationEngine>,
        inputs: Arc<dyn InputPreparer>,
        archive: Arc<dyn ArchiveSink>,
    ) -> Self {
        let registry = Arc::new(Registry::new(config.retention.clone()));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&registry), Arc::clone(&archive)));
        let poller = Arc::new(Poller::new(
            Arc::clone(&engine),
            Arc::clone(&reconciler),
            config.poll.clone(),
        ));
        let supervisor = Arc::new(PollerSupervisor::new(poller));
        let pipeline = Arc::new(SubmissionPipeline::new(
            engine,
            inputs,
            archive,
            Arc::clone(&reconciler),
            Arc::clone(&supervisor),
            config.submission(),
        ));

        Self {
            registry,
            pipeline,
            webhook: Arc::new(WebhookIngest::new(reconciler)),
            supervisor,
            config: Arc::new(config),
        }
    }
}
