// src/core/handler/command_router.rs

//! The central component for routing decoded requests to the session registry.
//!
//! The `Router` is the one place where request validation order is defined:
//! structural problems with the record are rejected before the registry is
//! consulted, and each well-formed request maps to exactly one registry
//! operation whose outcome becomes the reply.

use crate::core::protocol::{Request, ServerMessage};
use crate::core::state::{ConnectionId, Outbox, OutboxReceiver, RouteOutcome, SessionRegistry};
use crate::core::MessengerError;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, info_span};

/// The replies a request produces, in the order they must be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResponse {
    /// Exactly one reply, as for every request except a successful `LOGIN`.
    Single(ServerMessage),
    /// Several replies sent back to back. A successful `LOGIN` answers with
    /// `LOGIN_OK` followed by every message queued while the user was offline.
    Multiple(Vec<ServerMessage>),
}

impl RouteResponse {
    pub fn into_messages(self) -> Vec<ServerMessage> {
        match self {
            RouteResponse::Single(message) => vec![message],
            RouteResponse::Multiple(messages) => messages,
        }
    }
}

/// Runs `handler`, turning its error or panic into an `ERROR` reply. A panic is
/// reported as `INTERNAL_SERVER_ERROR` instead of unwinding into the caller.
pub fn contain_failures<F>(connection: ConnectionId, handler: F) -> RouteResponse
where
    F: FnOnce() -> Result<RouteResponse, MessengerError>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|_| {
        Err(MessengerError::Internal(
            "request handler panicked".into(),
        ))
    });

    match outcome {
        Ok(response) => response,
        Err(e) => {
            if let MessengerError::Internal(_) = e {
                error!("Connection {}: {}", connection, e);
            } else {
                debug!("Connection {}: request failed: {}", connection, e);
            }
            RouteResponse::Single(ServerMessage::Error(e.kind()))
        }
    }
}

/// Routes the requests of one connection.
///
/// The router borrows both halves of the connection's outbox: the sender is
/// bound to the session at `LOGIN`, and the receiver is emptied back into the
/// registry at `LOGOUT`.
pub struct Router<'a> {
    registry: &'a SessionRegistry,
    connection: ConnectionId,
    addr: SocketAddr,
    outbox: &'a Outbox,
    outbox_rx: &'a mut OutboxReceiver,
}

impl<'a> Router<'a> {
    pub fn new(
        registry: &'a SessionRegistry,
        connection: ConnectionId,
        addr: SocketAddr,
        outbox: &'a Outbox,
        outbox_rx: &'a mut OutboxReceiver,
    ) -> Self {
        Self {
            registry,
            connection,
            addr,
            outbox,
            outbox_rx,
        }
    }

    /// Parses one raw record and routes it.
    pub fn route_record(&mut self, raw: &str) -> RouteResponse {
        match Request::parse(raw) {
            Ok(request) => self.route(request),
            Err(e) => {
                debug!(
                    "Connection {}: rejecting record from {}: {}",
                    self.connection, self.addr, e
                );
                RouteResponse::Single(ServerMessage::Error(e.kind()))
            }
        }
    }

    /// Routes a decoded request. Never fails: every error becomes an `ERROR` reply,
    /// and a panic while handling the request is reported as
    /// `INTERNAL_SERVER_ERROR` instead of unwinding into the connection loop.
    pub fn route(&mut self, request: Request) -> RouteResponse {
        let span = info_span!(
            "command",
            name = request.name(),
            client.addr = %self.addr,
            client.id = %self.connection,
        );
        let _entered = span.enter();

        let connection = self.connection;
        contain_failures(connection, || self.execute(request))
    }

    fn execute(&mut self, request: Request) -> Result<RouteResponse, MessengerError> {
        match request {
            Request::Register {
                nickname,
                full_name,
            } => {
                self.registry.register(&nickname, &full_name)?;
                info!("User registered: {}", nickname);
                Ok(RouteResponse::Single(ServerMessage::Ok))
            }
            Request::Login { nickname } => {
                let drained =
                    self.registry
                        .login(&nickname, self.connection, self.outbox.clone())?;
                info!(
                    "Login: {} on {} ({} pending message(s))",
                    nickname,
                    self.connection,
                    drained.len()
                );
                let mut replies = Vec::with_capacity(drained.len() + 1);
                replies.push(ServerMessage::LoginOk { nickname });
                replies.extend(drained.into_iter().map(ServerMessage::Deliver));
                Ok(RouteResponse::Multiple(replies))
            }
            Request::Logout => {
                let nickname = self
                    .registry
                    .logout_reclaiming(self.connection, self.outbox_rx)?;
                info!("Logout: {}", nickname);
                Ok(RouteResponse::Single(ServerMessage::Ok))
            }
            Request::SendMessage { to, text } => {
                match self.registry.route(self.connection, &to, &text)? {
                    RouteOutcome::Delivered { connection } => {
                        debug!("Message delivered to {} on {}", to, connection);
                    }
                    RouteOutcome::Queued { depth } => {
                        info!("Message stored for offline user {} (queue depth {})", to, depth);
                    }
                }
                Ok(RouteResponse::Single(ServerMessage::Ok))
            }
            Request::ListUsers => Ok(RouteResponse::Single(ServerMessage::Users(
                self.registry.list_users(),
            ))),
            Request::DeleteUser { nickname } => {
                let discarded = self.registry.delete_user(&nickname, self.connection)?;
                info!(
                    "User deleted: {} ({} queued message(s) discarded)",
                    nickname, discarded
                );
                Ok(RouteResponse::Single(ServerMessage::Ok))
            }
        }
    }
}
