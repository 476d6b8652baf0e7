// src/core/mod.rs

//! The central module containing the core logic and data structures of the messenger.

pub mod errors;
pub mod handler;
pub mod protocol;
pub mod state;
pub mod validation;

pub use errors::MessengerError;
pub use protocol::{Request, ServerMessage};
