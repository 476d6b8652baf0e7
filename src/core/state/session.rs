// src/core/state/session.rs

//! Connection identities, outboxes and the records kept by the registry.

use crate::core::protocol::Delivery;
use std::fmt;
use tokio::sync::mpsc;

/// The opaque handle the supervisor assigns to each accepted connection.
///
/// Identities are never reused within a process, so a stale identity can only
/// ever miss in the registry, never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A delivery handed to a connection's outbox, tagged with the user it was
/// addressed to. The worker writes it only if that user is still the one bound
/// to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient: String,
    pub delivery: Delivery,
}

/// The sending half of a connection's outbox. Messages for a logged-in user that
/// originate on other connections are pushed here. Each item is bounded by the
/// record limit, and pushing never waits on the recipient's socket.
pub type Outbox = mpsc::UnboundedSender<OutboundMessage>;

/// The receiving half, owned by the connection's worker.
pub type OutboxReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// Creates the outbox for one connection.
pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// A registered user.
#[derive(Debug)]
pub(crate) struct User {
    pub(crate) full_name: String,
    pub(crate) logged_in: bool,
    /// The connection that most recently logged in as this user. Only that
    /// connection may delete the account.
    pub(crate) last_owner: Option<ConnectionId>,
}

impl User {
    pub(crate) fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            logged_in: false,
            last_owner: None,
        }
    }
}

/// The live binding of an online user to its connection.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) connection: ConnectionId,
    pub(crate) outbox: Outbox,
}
