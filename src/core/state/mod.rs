// src/core/state/mod.rs

//! The shared, lock-protected state of the server.

mod registry;
mod session;

pub use registry::{RegistryStats, RouteOutcome, SessionRegistry};
pub use session::{ConnectionId, OutboundMessage, Outbox, OutboxReceiver, outbox};
