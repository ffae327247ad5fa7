use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use uploader_api::app::{self, services::AppServices};
use uploader_infra::{config::Settings, operations::HttpRegistryClient};

// The registry client blocks, so it is built outside the async runtime and
// only called from the worker thread or `spawn_blocking`.
fn main() -> anyhow::Result<()> {
    uploader_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let client = HttpRegistryClient::new(&settings.environment)
        .context("failed to build registry client")?;

    let (services, worker) = app::services::build_services(&settings, Arc::new(client))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let served = runtime.block_on(serve(settings.bind_addr, services));
    drop(runtime);

    // The router owned the queue sender; the worker drains what is left and exits.
    let stats = worker.join();
    tracing::info!(
        processed = stats.jobs_processed,
        completed = stats.jobs_completed,
        failed = stats.jobs_failed,
        "shut down"
    );

    served
}

async fn serve(addr: SocketAddr, services: AppServices) -> anyhow::Result<()> {
    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
