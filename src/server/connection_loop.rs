// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::MessengerError;
use crate::core::state::ConnectionId;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for connection handlers to release their sessions.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Pause before accepting again once the process is out of descriptors or memory.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What the accept loop does about a failed `accept()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorAction {
    /// The failure belongs to one incoming connection; accept the next one.
    Skip,
    /// Resources are exhausted; wait briefly, then accept again.
    Backoff,
    /// The listening socket itself is broken; stop serving.
    Fatal,
}

/// Classifies an `accept()` error.
pub fn classify_accept_error(e: &io::Error) -> AcceptErrorAction {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => return AcceptErrorAction::Skip,
        io::ErrorKind::OutOfMemory => return AcceptErrorAction::Backoff,
        _ => {}
    }
    match e.raw_os_error() {
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
            AcceptErrorAction::Backoff
        }
        Some(libc::EPROTO | libc::EPERM) => AcceptErrorAction::Skip,
        _ => AcceptErrorAction::Fatal,
    }
}

/// The main server loop: accepts connections until `shutdown` completes, then
/// stops every connection handler and waits for them. A fatal listener error
/// also stops the loop, after the same orderly shutdown, and is returned.
pub async fn run(
    ctx: ServerContext,
    shutdown: impl Future<Output = ()>,
) -> Result<(), MessengerError> {
    let mut connection_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    let mut outcome = Ok(());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, closing the listener.");
                break;
            }

            res = ctx.listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => match classify_accept_error(&e) {
                        AcceptErrorAction::Skip => {
                            debug!("Failed to accept a connection: {}", e);
                            continue;
                        }
                        AcceptErrorAction::Backoff => {
                            warn!("Failed to accept connection, backing off: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        AcceptErrorAction::Fatal => {
                            error!("Listener failed, shutting down: {}", e);
                            outcome = Err(e.into());
                            break;
                        }
                    },
                };

                let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                    warn!(
                        "Rejecting connection from {}: max_clients ({}) reached.",
                        addr, ctx.config.max_clients
                    );
                    drop(socket);
                    continue;
                };

                connection_counter = connection_counter.wrapping_add(1);
                let connection = ConnectionId::new(connection_counter);
                info!("Accepted new connection from {} as {}", addr, connection);

                if let Err(e) = socket.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }

                let handler = ConnectionHandler::new(
                    socket,
                    addr,
                    ctx.registry.clone(),
                    connection,
                    &ctx.config.limits,
                    ctx.shutdown_tx.subscribe(),
                );
                client_tasks.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handler.run().await {
                        warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                    }
                });
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all connections.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No connection handlers were running at shutdown.");
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connections to close; aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    let stats = ctx.registry.stats();
    info!(
        "Server shutdown complete. {} registered user(s), {} message(s) still queued.",
        stats.registered, stats.queued
    );
    outcome
}
