// src/server/context.rs

use crate::config::Config;
use crate::core::state::SessionRegistry;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub connection_permits: Arc<Semaphore>,
}

impl ServerContext {
    /// The address the listener is actually bound to. Useful when the configured
    /// port lets the OS pick one.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
