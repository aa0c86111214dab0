mod config;
mod error;
mod pipeline;
mod runner;
mod sandbox;
mod server;

use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::info;

use crate::config::{resolve_port, RunnerConfig};
use crate::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("script_runner=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = RunnerConfig::from_env()?;
    info!(
        "Runner config: interpreter={}, work_root={:?}, timeout={:?}, max_concurrent_runs={:?}",
        config.interpreter, config.work_root, config.timeout, config.max_concurrent_runs
    );

    let cli_port = std::env::args().nth(1);
    let env_port = std::env::var("PORT").ok();
    let port = resolve_port(cli_port.as_deref(), env_port.as_deref());

    let app = server::router(Arc::new(Pipeline::new(config)));

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
