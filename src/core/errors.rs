// src/core/errors.rs

//! Defines the primary error type shared by the server and the client.

use crate::core::protocol::ErrorKind;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the messenger.
///
/// Request-level variants map one-to-one onto the wire `ErrorKind` through
/// [`MessengerError::kind`]; transport variants are fatal to a single connection.
#[derive(Error, Debug, Clone)]
pub enum MessengerError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Record exceeds the maximum size of {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("Record is not valid UTF-8")]
    InvalidUtf8,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Malformed request: {0}")]
    BadFormat(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Nickname is already registered")]
    NickTaken,

    #[error("No such user")]
    NoSuchUser,

    #[error("User is already online")]
    AlreadyOnline,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Command not allowed in the current state: {0}")]
    InvalidState(String),

    /// The server answered a request with an `ERROR` record.
    #[error("Server replied with {0}")]
    Server(ErrorKind),

    /// The peer sent a record that does not fit the expected exchange.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl MessengerError {
    /// Maps the error onto the error name reported to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessengerError::BadFormat(_) => ErrorKind::BadFormat,
            MessengerError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            MessengerError::NickTaken => ErrorKind::NickTaken,
            MessengerError::NoSuchUser => ErrorKind::NoSuchUser,
            MessengerError::AlreadyOnline => ErrorKind::AlreadyOnline,
            MessengerError::Unauthorized(_) => ErrorKind::Unauthorized,
            MessengerError::InvalidState(_) => ErrorKind::BadState,
            MessengerError::Server(kind) => *kind,
            MessengerError::Io(_)
            | MessengerError::FrameTooLarge { .. }
            | MessengerError::InvalidUtf8
            | MessengerError::ConnectionClosed
            | MessengerError::Protocol(_)
            | MessengerError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// True for failures of the byte stream itself, which end the connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MessengerError::Io(_)
                | MessengerError::FrameTooLarge { .. }
                | MessengerError::InvalidUtf8
                | MessengerError::ConnectionClosed
        )
    }
}

impl PartialEq for MessengerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MessengerError::Io(e1), MessengerError::Io(e2)) => e1.kind() == e2.kind(),
            (
                MessengerError::FrameTooLarge { limit: l1 },
                MessengerError::FrameTooLarge { limit: l2 },
            ) => l1 == l2,
            (MessengerError::BadFormat(s1), MessengerError::BadFormat(s2)) => s1 == s2,
            (MessengerError::UnknownCommand(s1), MessengerError::UnknownCommand(s2)) => s1 == s2,
            (MessengerError::Unauthorized(s1), MessengerError::Unauthorized(s2)) => s1 == s2,
            (MessengerError::InvalidState(s1), MessengerError::InvalidState(s2)) => s1 == s2,
            (MessengerError::Server(k1), MessengerError::Server(k2)) => k1 == k2,
            (MessengerError::Protocol(s1), MessengerError::Protocol(s2)) => s1 == s2,
            (MessengerError::Internal(s1), MessengerError::Internal(s2)) => s1 == s2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for MessengerError {
    fn from(e: std::io::Error) -> Self {
        MessengerError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for MessengerError {
    fn from(e: serde_json::Error) -> Self {
        MessengerError::BadFormat(e.to_string())
    }
}
