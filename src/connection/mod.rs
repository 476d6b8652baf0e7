// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: reading records,
//! routing them, writing replies and deliveries, and releasing the session
//! when the connection ends.

mod guard;
mod handler;
mod lifecycle;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use lifecycle::ConnectionState;
