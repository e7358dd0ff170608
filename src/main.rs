//! Service entry point: wire configuration, backend client, pipeline, and
//! queue together, then serve the HTTP API until interrupted.

use std::sync::Arc;

use tracing::info;

use fategen::backend::ComfyBackend;
use fategen::config::{ModelRegistry, ServiceConfig};
use fategen::core::{GenerationPipeline, QueueService};
use fategen::output::OutputStore;
use fategen::prompt::WorkflowLibrary;
use fategen::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = ServiceConfig::from_env()?;
    info!(
        backend = %config.http_url(),
        workers = config.max_concurrent_jobs,
        idle_delay_secs = config.inactivity_delay.as_secs(),
        "configuration loaded"
    );

    let registry = Arc::new(ModelRegistry::from_path(&config.model_config_path)?);
    info!(models = ?registry.model_names(), "model registry loaded");

    let backend: Arc<ComfyBackend> =
        Arc::new(ComfyBackend::new(config.http_url(), config.ws_url()));
    let pipeline = GenerationPipeline::new(
        Arc::clone(&registry),
        WorkflowLibrary::new(&config.workflow_dir),
        backend.clone(),
        OutputStore::new(&config.output_dir),
        config.web_domain.clone(),
    );

    let service = QueueService::start(
        config.queue_options(),
        registry,
        Arc::new(pipeline),
        backend,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, server::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
