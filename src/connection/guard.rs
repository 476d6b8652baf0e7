// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard that releases a connection's session.

use crate::core::state::{ConnectionId, OutboundMessage, OutboxReceiver, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// An RAII guard to ensure a connection's session is always released when its
/// handler's scope is exited, including by a panic.
pub struct ConnectionGuard {
    /// A shared reference to the session registry.
    pub(crate) registry: Arc<SessionRegistry>,
    /// The identity of the guarded connection.
    pub(crate) connection: ConnectionId,
    /// The network address of the client.
    pub(crate) addr: SocketAddr,
    /// Set once cleanup has run, so it runs exactly once.
    released: bool,
}

impl ConnectionGuard {
    pub fn new(registry: Arc<SessionRegistry>, connection: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            registry,
            connection,
            addr,
            released: false,
        }
    }

    /// Releases the session bound to the connection and hands `unsent` plus
    /// whatever is still in the outbox back to the registry. Returns the nickname
    /// that was bound. Later calls, and the eventual `Drop`, do nothing.
    pub fn release(
        &mut self,
        outbox_rx: &mut OutboxReceiver,
        unsent: Vec<OutboundMessage>,
    ) -> Option<String> {
        if self.released {
            return None;
        }
        self.released = true;

        let nickname = self.registry.release(self.connection, outbox_rx, unsent);
        self.log_release(&nickname);
        nickname
    }

    fn log_release(&self, nickname: &Option<String>) {
        match nickname {
            Some(nickname) => info!(
                "Session cleaned up for {} ({} from {}).",
                nickname, self.connection, self.addr
            ),
            None => debug!(
                "Connection {} from {} closed without an active session.",
                self.connection, self.addr
            ),
        }
    }
}

impl Drop for ConnectionGuard {
    /// Only reached without an explicit `release` if the handler unwound; the
    /// session is still released.
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let nickname = self.registry.cleanup(self.connection);
        self.log_release(&nickname);
    }
}
