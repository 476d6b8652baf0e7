// src/client/mod.rs

//! An async client for the messenger protocol, used by the `client` binary and
//! by the integration tests.

pub mod command;
pub mod render;

pub use command::{ClientCommand, CommandParseError};

use crate::core::MessengerError;
use crate::core::protocol::{
    CLIENT_MAX_RECORD_BYTES, Delivery, Envelope, LineCodec, Request, ServerMessage, UserInfo,
};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// A connection to a messenger server.
///
/// Deliveries can arrive between a request and its reply. The typed helpers
/// set them aside in an inbox, which `next_delivery` drains first.
pub struct MessengerClient {
    framed: Framed<TcpStream, LineCodec>,
    inbox: VecDeque<Delivery>,
}

impl MessengerClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self, MessengerError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, LineCodec::new(CLIENT_MAX_RECORD_BYTES)),
            inbox: VecDeque::new(),
        }
    }

    /// Writes one request without waiting for its reply.
    pub async fn send(&mut self, request: Request) -> Result<(), MessengerError> {
        debug!("Sending {} request", request.name());
        self.framed.send(request).await
    }

    /// Writes a raw record. Only useful for exercising the server's error paths.
    pub async fn send_raw(&mut self, record: &str) -> Result<(), MessengerError> {
        use tokio::io::AsyncWriteExt;
        let stream = self.framed.get_mut();
        stream.write_all(record.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads the next message from the server, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<Result<ServerMessage, MessengerError>> {
        let record = match self.framed.next().await? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        Some(parse_server_record(&record))
    }

    /// Sends a request and waits for its reply, setting aside any deliveries
    /// that arrive first.
    pub async fn call(&mut self, request: Request) -> Result<ServerMessage, MessengerError> {
        self.send(request).await?;
        loop {
            match self.recv().await {
                Some(Ok(ServerMessage::Deliver(delivery))) => self.inbox.push_back(delivery),
                Some(reply) => return reply,
                None => return Err(MessengerError::ConnectionClosed),
            }
        }
    }

    pub async fn register(&mut self, nickname: &str, full_name: &str) -> Result<(), MessengerError> {
        let reply = self
            .call(Request::Register {
                nickname: nickname.to_string(),
                full_name: full_name.to_string(),
            })
            .await?;
        expect_ok(reply)
    }

    /// Logs in and returns the nickname the server confirmed. Messages queued
    /// while the user was offline follow and are read with `next_delivery`.
    pub async fn login(&mut self, nickname: &str) -> Result<String, MessengerError> {
        let reply = self
            .call(Request::Login {
                nickname: nickname.to_string(),
            })
            .await?;
        match reply {
            ServerMessage::LoginOk { nickname } => Ok(nickname),
            other => Err(unexpected(other)),
        }
    }

    pub async fn logout(&mut self) -> Result<(), MessengerError> {
        let reply = self.call(Request::Logout).await?;
        expect_ok(reply)
    }

    pub async fn send_message(&mut self, to: &str, text: &str) -> Result<(), MessengerError> {
        let reply = self
            .call(Request::SendMessage {
                to: to.to_string(),
                text: text.to_string(),
            })
            .await?;
        expect_ok(reply)
    }

    pub async fn list_users(&mut self) -> Result<Vec<UserInfo>, MessengerError> {
        match self.call(Request::ListUsers).await? {
            ServerMessage::Users(users) => Ok(users),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_user(&mut self, nickname: &str) -> Result<(), MessengerError> {
        let reply = self
            .call(Request::DeleteUser {
                nickname: nickname.to_string(),
            })
            .await?;
        expect_ok(reply)
    }

    /// The oldest delivery set aside by an earlier call, or the next one read
    /// from the server.
    pub async fn next_delivery(&mut self) -> Result<Delivery, MessengerError> {
        if let Some(delivery) = self.inbox.pop_front() {
            return Ok(delivery);
        }
        match self.recv().await {
            Some(Ok(ServerMessage::Deliver(delivery))) => Ok(delivery),
            Some(Ok(other)) => Err(unexpected(other)),
            Some(Err(e)) => Err(e),
            None => Err(MessengerError::ConnectionClosed),
        }
    }

    /// Deliveries set aside so far, oldest first.
    pub fn take_inbox(&mut self) -> Vec<Delivery> {
        self.inbox.drain(..).collect()
    }
}

/// Decodes one record received from the server.
pub fn parse_server_record(record: &str) -> Result<ServerMessage, MessengerError> {
    let envelope: Envelope = serde_json::from_str(record)
        .map_err(|e| MessengerError::Protocol(format!("malformed record from server: {e}")))?;
    ServerMessage::try_from(envelope)
}

fn expect_ok(reply: ServerMessage) -> Result<(), MessengerError> {
    match reply {
        ServerMessage::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: ServerMessage) -> MessengerError {
    match reply {
        ServerMessage::Error(kind) => MessengerError::Server(kind),
        other => MessengerError::Protocol(format!("unexpected {} reply", other.name())),
    }
}
