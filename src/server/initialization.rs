// src/server/initialization.rs

//! Builds the registry and binds the listener before the main loop starts.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::SessionRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let registry = Arc::new(SessionRegistry::new());
    info!("Session registry initialized.");

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read the listener's local address")?;
    info!("Messenger server listening on {}", local_addr);

    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    Ok(ServerContext {
        config,
        registry,
        listener,
        shutdown_tx,
        connection_permits,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Accepting up to {} concurrent connections.",
        config.max_clients
    );
    info!(
        "Records are limited to {} bytes.",
        config.limits.max_record_bytes
    );
}
