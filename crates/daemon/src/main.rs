//! Pyron Signal Buffer - Main Entry Point
//! HTTP ingress + Redis-buffered consumer persisting into the document store

mod lifecycle;
mod settings;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use lifecycle::Mode;
use pyron_api_http::{HttpServer, HttpServerConfig, ServerHandle};
use pyron_core::application::{
    shutdown_channel, Connections, Consumer, ConsumerStats, SignalProducer,
};
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type WorkerHandle = JoinHandle<pyron_core::Result<ConsumerStats>>;

#[derive(Debug, Parser)]
#[command(
    name = "pyron",
    version,
    about = "Webhook buffer: HTTP ingress, Redis queue, document store"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PYRON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = cli.mode.unwrap_or(Mode::All);

    // 1. Configuration, then logging (format comes from settings)
    let settings = Settings::load(cli.config.as_deref())?;
    let _log_guard = telemetry::init_tracing(settings.log_format)?;

    info!(?mode, "Pyron signal buffer v{} starting...", VERSION);

    // 2. Connections (fatal on failure)
    let connections = Arc::new(lifecycle::establish(&settings, mode).await?);
    let channel = settings.queue_channel()?;
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    // 3. HTTP ingress
    let server = if mode.runs_api() {
        let producer = Arc::new(SignalProducer::from_connections(&connections, channel.clone()));
        let config = HttpServerConfig {
            host: settings.host.clone(),
            port: settings.port,
            api_prefix: settings.api_prefix.clone(),
            request_timeout: settings.request_timeout(),
        };
        let mut token = shutdown_tx.token();
        let handle = HttpServer::new(config, producer)
            .start(async move { token.wait().await })
            .await;
        match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                connections.close().await;
                return Err(e).context("HTTP server start failed");
            }
        }
    } else {
        None
    };

    // 4. Consumer
    let mut worker: Option<WorkerHandle> = if mode.runs_worker() {
        let consumer = Consumer::new(
            channel,
            connections.require_queue()?,
            connections.require_store()?,
            settings.delivery_policy,
        )
        .with_backoff(settings.backoff());

        Some(tokio::spawn(async move { consumer.run(shutdown_rx).await }))
    } else {
        None
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 5. Wait for a signal, or for the consumer to give up on setup
    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received. Exiting gracefully...");
            None
        }
        result = wait_worker(&mut worker) => Some(result),
    };
    if early_exit.is_some() {
        worker = None;
    }

    // 6. Graceful shutdown: stop accepting, drain, then release connections
    shutdown_tx.shutdown();
    let grace = settings.shutdown_grace();
    if let Some(server) = server {
        stop_server(server, grace).await;
    }
    if let Some(worker) = worker {
        stop_worker(worker, grace, &connections).await;
    }
    connections.close().await;

    info!("Shutdown complete.");

    match early_exit {
        Some(Ok(Err(e))) => Err(e).context("Consumer failed"),
        Some(Err(e)) => Err(e).context("Consumer task panicked"),
        _ => Ok(()),
    }
}

async fn wait_worker(
    worker: &mut Option<WorkerHandle>,
) -> std::result::Result<pyron_core::Result<ConsumerStats>, tokio::task::JoinError> {
    match worker {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn stop_server(server: ServerHandle, grace: Duration) {
    match tokio::time::timeout(grace, server.stopped()).await {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "HTTP server did not drain in time"),
    }
}

/// Wait for the consumer; if it overruns the grace period, closing the
/// connections forces any blocking wait to return.
async fn stop_worker(mut worker: WorkerHandle, grace: Duration, connections: &Connections) {
    let result = match tokio::time::timeout(grace, &mut worker).await {
        Ok(result) => result,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Consumer still busy, closing connections");
            connections.close().await;
            match tokio::time::timeout(grace, worker).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Consumer did not stop after connections were closed");
                    return;
                }
            }
        }
    };

    match result {
        Ok(Ok(stats)) => info!(persisted = stats.persisted, "Consumer finished"),
        Ok(Err(e)) => error!(error = %e, "Consumer failed"),
        Err(e) => error!(error = %e, "Consumer task panicked"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
