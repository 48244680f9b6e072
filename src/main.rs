use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tradeops_stream::{init_logging, LogSink, ServerConfig, StreamServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Invalid configuration")?;
    init_logging(config.log_level);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Unable to listen for Ctrl+C: {}", e);
                // Keep the sender alive so the server keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    StreamServer::new(config, Arc::new(LogSink))
        .run(listener, shutdown_rx)
        .await?;

    Ok(())
}
