//! Memory Fabric HTTP server.
//!
//! Run with: memory-fabric-server

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memory_fabric::config::Config;
use memory_fabric::error::Result;
use memory_fabric::governor::Governor;
use memory_fabric::http;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (governor, receiver) = Governor::new(config.clone())?;
    let _worker = governor.spawn_worker(receiver);

    let addr: SocketAddr = format!("{}:{}", config.bind_host, config.port)
        .parse()
        .map_err(|err| memory_fabric::error::FabricError::Config(format!("invalid bind address: {err}")))?;

    tracing::info!(%addr, "memory fabric server listening");

    let app = http::router(Arc::clone(&governor));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for ctrl-c (or SIGTERM on unix); the in-flight write-back worker
/// job finishes before the process exits rather than being cut off mid-job.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
