// src/client/render.rs

//! Turns server messages into the plain text printed by the client.

use crate::core::protocol::{Delivery, ServerMessage, UserInfo};
use chrono::{DateTime, Local};

/// Renders one server message for the terminal.
pub fn describe(message: &ServerMessage) -> String {
    match message {
        ServerMessage::Ok => "[ok]".to_string(),
        ServerMessage::LoginOk { nickname } => format!("[ok] logged in as {nickname}"),
        ServerMessage::Error(kind) => format!("[error] {kind}"),
        ServerMessage::Deliver(delivery) => describe_delivery(delivery),
        ServerMessage::Users(users) => describe_users(users),
    }
}

/// `[from @ HH:MM:SS] text`, in local time.
pub fn describe_delivery(delivery: &Delivery) -> String {
    let time = DateTime::from_timestamp(delivery.timestamp, 0)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| delivery.timestamp.to_string());
    format!("[{} @ {}] {}", delivery.from, time, delivery.text)
}

fn describe_users(users: &[UserInfo]) -> String {
    if users.is_empty() {
        return "No registered users.".to_string();
    }
    let mut out = format!("{} user(s):", users.len());
    for user in users {
        let marker = if user.online { "online" } else { "offline" };
        out.push_str(&format!(
            "\n  {} ({}) - {}",
            user.nickname, user.full_name, marker
        ));
    }
    out
}
