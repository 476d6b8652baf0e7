// src/server/mod.rs

use crate::config::Config;
use crate::core::MessengerError;
use anyhow::{Context, Result};
use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

mod connection_loop;
mod context;
mod initialization;

pub use connection_loop::{AcceptErrorAction, classify_accept_error};
pub use context::ServerContext;

/// Builds the registry and binds the listener described by `config`.
pub async fn bind(config: Config) -> Result<ServerContext> {
    initialization::setup(config).await
}

/// Accepts and serves connections until `shutdown` completes, then closes every
/// connection and waits for their sessions to be released. Returns the listener
/// error if accepting failed for good.
pub async fn serve(
    ctx: ServerContext,
    shutdown: impl Future<Output = ()>,
) -> Result<(), MessengerError> {
    connection_loop::run(ctx, shutdown).await
}

/// The main server startup function: binds, then serves until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let ctx = bind(config).await?;

    serve(ctx, async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    })
    .await
    .context("Stopped accepting connections")
}
