use std::sync::Arc;

use anyhow::Context;
use gateway_config::GatewayConfig;
use gateway_core::GatewayCore;
use gateway_node::http;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env().context("failed to load gateway configuration")?;
    let bind_addr = config.bind_addr;

    let core = Arc::new(GatewayCore::new(config));
    core.start().await;

    let app = http::router(Arc::clone(&core));
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(%bind_addr, "telemetry gateway listening");
    axum::serve(listener, app).await.context("server exited")?;

    Ok(())
}
