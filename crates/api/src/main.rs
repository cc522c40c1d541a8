use std::sync::Arc;

use anyhow::Context;

use warehouse_api::app::{build_app, services};
use warehouse_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;
    warehouse_observability::init(&config.log);

    let services = Arc::new(services::build_services(&config).await?);
    let runner = services
        .runner
        .spawn("replenishment", Arc::clone(&services.store));

    let app = build_app(Arc::clone(&services));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runner.shutdown().await;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down gracefully");
}
