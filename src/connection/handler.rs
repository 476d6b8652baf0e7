// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::lifecycle::ConnectionState;
use crate::config::LimitsConfig;
use crate::core::MessengerError;
use crate::core::handler::{RouteResponse, Router};
use crate::core::protocol::{LineCodec, ServerMessage};
use crate::core::state::{
    ConnectionId, OutboundMessage, Outbox, OutboxReceiver, SessionRegistry, outbox,
};
use futures::{SinkExt, StreamExt, stream};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Manages the full lifecycle of a client connection.
///
/// The handler owns the socket and the receiving half of the connection's
/// outbox. It alternates between reading one request and writing its replies,
/// and writing messages that other connections routed to the logged-in user.
pub struct ConnectionHandler<S = TcpStream> {
    framed: Framed<S, LineCodec>,
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    connection: ConnectionId,
    outbox: Outbox,
    outbox_rx: OutboxReceiver,
    /// A delivery taken from the outbox whose write failed.
    unsent: Vec<OutboundMessage>,
    shutdown_rx: broadcast::Receiver<()>,
    state: ConnectionState,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new `ConnectionHandler` for an accepted socket.
    pub fn new(
        socket: S,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        connection: ConnectionId,
        limits: &LimitsConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self::with_outbox(
            socket,
            addr,
            registry,
            connection,
            limits,
            shutdown_rx,
            outbox(),
        )
    }

    /// Creates a handler around an existing outbox, which may already hold
    /// messages for the connection.
    pub fn with_outbox(
        socket: S,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        connection: ConnectionId,
        limits: &LimitsConfig,
        shutdown_rx: broadcast::Receiver<()>,
        (outbox, outbox_rx): (Outbox, OutboxReceiver),
    ) -> Self {
        Self {
            framed: Framed::new(socket, LineCodec::new(limits.max_record_bytes)),
            addr,
            registry,
            connection,
            outbox,
            outbox_rx,
            unsent: Vec::new(),
            shutdown_rx,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Runs the connection until the peer leaves, the stream breaks or the server
    /// shuts down, then releases the session. Normal disconnects are not errors.
    pub async fn run(mut self) -> Result<(), MessengerError> {
        let mut guard = ConnectionGuard::new(self.registry.clone(), self.connection, self.addr);
        self.advance(ConnectionState::Open);

        let result = self.serve().await;

        self.advance(ConnectionState::Closing);
        self.close(&mut guard);
        self.advance(ConnectionState::Closed);

        match result {
            Err(e) if is_normal_disconnect(&e) => {
                debug!("Connection from {} closed by peer: {}", self.addr, e);
                Ok(())
            }
            other => other,
        }
    }

    /// The main event loop for the connection.
    async fn serve(&mut self) -> Result<(), MessengerError> {
        loop {
            tokio::select! {
                // Prioritize shutdown over everything else, and pending deliveries
                // over reading the next request.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    return Ok(());
                }
                Some(outbound) = self.outbox_rx.recv() => {
                    self.forward(outbound).await?;
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(record)) => self.process_record(&record).await?,
                        Some(Err(e)) => return Err(e),
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Routes one record and writes every reply it produced, in order.
    async fn process_record(&mut self, record: &str) -> Result<(), MessengerError> {
        debug!("{}: received record: {}", self.connection, record);

        let response = Router::new(
            &self.registry,
            self.connection,
            self.addr,
            &self.outbox,
            &mut self.outbox_rx,
        )
        .route_record(record);

        match response {
            RouteResponse::Single(reply) => {
                debug!("{}: sending single reply: {:?}", self.connection, reply);
                self.framed.send(reply).await?;
            }
            RouteResponse::Multiple(replies) => {
                debug!("{}: sending {} replies", self.connection, replies.len());
                let mut replies = stream::iter(replies).map(Ok::<_, MessengerError>);
                self.framed.send_all(&mut replies).await?;
            }
        }
        Ok(())
    }

    /// Writes a message routed here by another connection, provided its recipient
    /// is still the user bound to this connection. Otherwise the message goes back
    /// to the recipient, wherever it is now.
    async fn forward(&mut self, outbound: OutboundMessage) -> Result<(), MessengerError> {
        let bound = self.registry.nickname_of(self.connection);
        if bound.as_deref() != Some(outbound.recipient.as_str()) {
            debug!(
                "{}: {} is no longer logged in here; requeueing message.",
                self.connection, outbound.recipient
            );
            self.registry.requeue_front(vec![outbound]);
            return Ok(());
        }

        let reply = ServerMessage::Deliver(outbound.delivery.clone());
        if let Err(e) = self.framed.send(reply).await {
            self.unsent.push(outbound);
            return Err(e);
        }
        Ok(())
    }

    /// Releases the session and hands any message not yet written back to its
    /// recipient, in one registry step.
    fn close(&mut self, guard: &mut ConnectionGuard) {
        let unsent = std::mem::take(&mut self.unsent);
        guard.release(&mut self.outbox_rx, unsent);
    }

    fn advance(&mut self, next: ConnectionState) {
        if !self.state.can_advance_to(next) {
            warn!(
                "{}: unexpected state change {} -> {}",
                self.connection, self.state, next
            );
        }
        debug!("{}: {} -> {}", self.connection, self.state, next);
        self.state = next;
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &MessengerError) -> bool {
    match e {
        MessengerError::ConnectionClosed => true,
        MessengerError::Io(arc_err) => matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
