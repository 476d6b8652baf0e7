// src/core/protocol/mod.rs

pub mod line_codec;
pub mod message;
pub use line_codec::{CLIENT_MAX_RECORD_BYTES, DEFAULT_MAX_RECORD_BYTES, LineCodec};
pub use message::{Delivery, Envelope, ErrorKind, Request, ServerMessage, UserInfo};
