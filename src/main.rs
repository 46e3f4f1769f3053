//! ring-bridge - Ring cloud bridge
//!
//! Mirrors the cameras of a Ring account into a home-automation state tree,
//! keeps the cloud session alive, and forwards state changes back to Ring.

mod config;
mod console;
mod device;
mod error;
mod host;
mod manager;
mod ring;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::console::{Command, ParseError};
use crate::host::{AdapterHost, JsonFileHost};
use crate::manager::RingManager;
use crate::ring::SnapshotConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ring_bridge=info".into()),
        )
        .init();

    tracing::info!("Starting ring-bridge...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!("Configuration loaded (namespace: {})", config.adapter.namespace);

    let host = Arc::new(JsonFileHost::open(config.adapter.clone(), &config.host.state_file).await?);
    let connector = Arc::new(SnapshotConnector::new(&config.cloud.snapshot_file));
    let manager = Arc::new(RingManager::new(host.clone(), connector));

    if !manager.validate_refresh_token() {
        host.terminate("Invalid Refresh Token, please generate a new one");
        anyhow::bail!("invalid refresh token");
    }

    let mut termination = host.termination();
    manager.init().await?;
    tracing::info!("Ring connection established, {} devices mirrored", manager.device_count().await);

    run_console(&manager, &mut termination).await;

    manager.unload().await;
    tracing::info!("ring-bridge stopped");
    Ok(())
}

/// Serve console commands until ctrl-c or the adapter is terminated
async fn run_console(manager: &Arc<RingManager>, termination: &mut watch::Receiver<Option<String>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received ctrl-c, shutting down");
                break;
            }
            changed = termination.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(reason) = termination.borrow().as_deref() {
                    tracing::warn!("Adapter terminated: {}", reason);
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(command) => command.execute(manager).await,
                    Err(ParseError::Empty) => {}
                    Err(ParseError::Usage(usage)) => tracing::warn!("Usage: {}", usage),
                    Err(ParseError::Unknown(cmd)) => tracing::warn!("Unknown command: {}", cmd),
                },
                Ok(None) => {
                    tracing::debug!("stdin closed, console disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }
}
