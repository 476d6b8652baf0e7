// src/core/protocol/message.rs

//! The message vocabulary exchanged between clients and the server.
//!
//! Every record on the wire is a JSON object with a `type` string and, for most
//! types, a `payload` object. `DELIVER_MSG` additionally carries the sender in a
//! top-level `from` field. [`Envelope`] models that shared shape; [`Request`] and
//! [`ServerMessage`] are the typed views of each direction.

use crate::core::MessengerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// The error names the server reports in `ERROR` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NickTaken,
    BadFormat,
    NoSuchUser,
    AlreadyOnline,
    Unauthorized,
    BadState,
    UnknownCommand,
    InternalServerError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NickTaken => "NICK_TAKEN",
            ErrorKind::BadFormat => "BAD_FORMAT",
            ErrorKind::NoSuchUser => "NO_SUCH_USER",
            ErrorKind::AlreadyOnline => "ALREADY_ONLINE",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::BadState => "BAD_STATE",
            ErrorKind::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Parses an error name; names this build does not know become
    /// `INTERNAL_SERVER_ERROR`.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "NICK_TAKEN" => ErrorKind::NickTaken,
            "BAD_FORMAT" => ErrorKind::BadFormat,
            "NO_SUCH_USER" => ErrorKind::NoSuchUser,
            "ALREADY_ONLINE" => ErrorKind::AlreadyOnline,
            "UNAUTHORIZED" => ErrorKind::Unauthorized,
            "BAD_STATE" => ErrorKind::BadState,
            "UNKNOWN_COMMAND" => ErrorKind::UnknownCommand,
            _ => ErrorKind::InternalServerError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw JSON object carried by every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    fn new(kind: &str, payload: Option<Value>) -> Self {
        Self {
            kind: kind.to_string(),
            from: None,
            payload,
        }
    }

    /// Reads a string field out of the payload object.
    fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.as_ref()?.get(field)?.as_str()
    }
}

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { nickname: String, full_name: String },
    Login { nickname: String },
    Logout,
    SendMessage { to: String, text: String },
    ListUsers,
    DeleteUser { nickname: String },
}

#[derive(Deserialize)]
struct RegisterPayload {
    nickname: String,
    #[serde(rename = "fullname")]
    full_name: String,
}

#[derive(Deserialize)]
struct NicknamePayload {
    nickname: String,
}

#[derive(Deserialize)]
struct SendPayload {
    to: String,
    text: String,
}

impl Request {
    /// The wire name of the request type.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Register { .. } => "REGISTER",
            Request::Login { .. } => "LOGIN",
            Request::Logout => "LOGOUT",
            Request::SendMessage { .. } => "SEND_MSG",
            Request::ListUsers => "LIST_USERS",
            Request::DeleteUser { .. } => "DELETE_USER",
        }
    }

    /// Parses one raw record.
    ///
    /// A record that is not a JSON object with a string `type` is `BadFormat`;
    /// an unrecognized `type` is `UnknownCommand`; a recognized type whose
    /// payload lacks a required string field is `BadFormat`.
    pub fn parse(raw: &str) -> Result<Self, MessengerError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        Self::try_from(envelope)
    }
}

fn payload_as<T: DeserializeOwned>(payload: Option<Value>) -> Result<T, MessengerError> {
    let payload = payload.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(payload).map_err(MessengerError::from)
}

impl TryFrom<Envelope> for Request {
    type Error = MessengerError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        match envelope.kind.as_str() {
            "REGISTER" => {
                let p: RegisterPayload = payload_as(envelope.payload)?;
                Ok(Request::Register {
                    nickname: p.nickname,
                    full_name: p.full_name,
                })
            }
            "LOGIN" => {
                let p: NicknamePayload = payload_as(envelope.payload)?;
                Ok(Request::Login {
                    nickname: p.nickname,
                })
            }
            "LOGOUT" => Ok(Request::Logout),
            "SEND_MSG" => {
                let p: SendPayload = payload_as(envelope.payload)?;
                Ok(Request::SendMessage {
                    to: p.to,
                    text: p.text,
                })
            }
            "LIST_USERS" => Ok(Request::ListUsers),
            "DELETE_USER" => {
                let p: NicknamePayload = payload_as(envelope.payload)?;
                Ok(Request::DeleteUser {
                    nickname: p.nickname,
                })
            }
            other => Err(MessengerError::UnknownCommand(other.to_string())),
        }
    }
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        let name = request.name();
        let payload = match request {
            Request::Register {
                nickname,
                full_name,
            } => json!({ "nickname": nickname, "fullname": full_name }),
            Request::Login { nickname } | Request::DeleteUser { nickname } => {
                json!({ "nickname": nickname })
            }
            Request::SendMessage { to, text } => json!({ "to": to, "text": text }),
            Request::Logout | Request::ListUsers => Value::Object(Map::new()),
        };
        Envelope::new(name, Some(payload))
    }
}

/// A direct message as seen by its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: String,
    pub text: String,
    /// Send time in unix seconds.
    pub timestamp: i64,
}

/// One row of a `USERS` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "nick")]
    pub nickname: String,
    #[serde(rename = "name")]
    pub full_name: String,
    pub online: bool,
}

/// A record sent by the server: a reply to a request, or a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Ok,
    LoginOk { nickname: String },
    Error(ErrorKind),
    Deliver(Delivery),
    Users(Vec<UserInfo>),
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Ok => "OK",
            ServerMessage::LoginOk { .. } => "LOGIN_OK",
            ServerMessage::Error(_) => "ERROR",
            ServerMessage::Deliver(_) => "DELIVER_MSG",
            ServerMessage::Users(_) => "USERS",
        }
    }
}

impl From<ServerMessage> for Envelope {
    fn from(message: ServerMessage) -> Self {
        let name = message.name();
        match message {
            ServerMessage::Ok => Envelope::new(name, None),
            ServerMessage::LoginOk { nickname } => {
                Envelope::new(name, Some(json!({ "nickname": nickname })))
            }
            ServerMessage::Error(kind) => {
                Envelope::new(name, Some(json!({ "message": kind.as_str() })))
            }
            ServerMessage::Deliver(delivery) => Envelope {
                kind: name.to_string(),
                from: Some(delivery.from),
                payload: Some(json!({ "text": delivery.text, "ts": delivery.timestamp })),
            },
            ServerMessage::Users(users) => {
                Envelope::new(name, Some(json!({ "users": users })))
            }
        }
    }
}

impl TryFrom<Envelope> for ServerMessage {
    type Error = MessengerError;

    fn try_from(envelope: Envelope) -> Result<Self, MessengerError> {
        let missing = |field: &str| {
            MessengerError::Protocol(format!(
                "{} record without '{}'",
                envelope.kind, field
            ))
        };
        match envelope.kind.as_str() {
            "OK" => Ok(ServerMessage::Ok),
            "LOGIN_OK" => {
                let nickname = envelope
                    .payload_str("nickname")
                    .ok_or_else(|| missing("nickname"))?;
                Ok(ServerMessage::LoginOk {
                    nickname: nickname.to_string(),
                })
            }
            "ERROR" => {
                let name = envelope
                    .payload_str("message")
                    .ok_or_else(|| missing("message"))?;
                Ok(ServerMessage::Error(ErrorKind::from_wire(name)))
            }
            "DELIVER_MSG" => {
                let from = envelope.from.clone().ok_or_else(|| missing("from"))?;
                let text = envelope
                    .payload_str("text")
                    .ok_or_else(|| missing("text"))?
                    .to_string();
                let timestamp = envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("ts"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| missing("ts"))?;
                Ok(ServerMessage::Deliver(Delivery {
                    from,
                    text,
                    timestamp,
                }))
            }
            "USERS" => {
                let users = envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("users"))
                    .cloned()
                    .ok_or_else(|| missing("users"))?;
                let users: Vec<UserInfo> = serde_json::from_value(users)
                    .map_err(|e| MessengerError::Protocol(e.to_string()))?;
                Ok(ServerMessage::Users(users))
            }
            other => Err(MessengerError::Protocol(format!(
                "unexpected record type '{other}'"
            ))),
        }
    }
}
