// src/client/command.rs

//! Parses the lines typed into the interactive client.

use crate::core::protocol::Request;
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  register <nickname> \"<full name>\"   create an account
  login <nickname>                    log in
  list                                list registered users
  msg <nickname> <text>               send a message
  logout                              log out, keeping the connection
  delete <nickname>                   delete your account (log out first)
  help                                show this help
  quit                                leave";

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Help,
    Quit,
    /// A command that becomes a request to the server.
    Request(Request),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}'. Type 'help' to see the commands.")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unbalanced quotes")]
    UnbalancedQuotes,
}

impl ClientCommand {
    /// Parses one input line. The command word is case-insensitive; arguments
    /// are kept as typed.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        if word.is_empty() {
            return Err(CommandParseError::Empty);
        }

        let request = match word.to_ascii_lowercase().as_str() {
            "help" => return Ok(ClientCommand::Help),
            "quit" | "exit" => return Ok(ClientCommand::Quit),
            "register" => {
                const USAGE: &str = "register <nickname> \"<full name>\"";
                let (nickname, full_name) =
                    split_first(rest).ok_or(CommandParseError::Usage(USAGE))?;
                let full_name = unquote(full_name)?;
                if full_name.is_empty() {
                    return Err(CommandParseError::Usage(USAGE));
                }
                Request::Register {
                    nickname: nickname.to_string(),
                    full_name: full_name.to_string(),
                }
            }
            "login" => Request::Login {
                nickname: single_arg(rest, "login <nickname>")?,
            },
            "list" => Request::ListUsers,
            "msg" => {
                let (to, text) =
                    split_first(rest).ok_or(CommandParseError::Usage("msg <nickname> <text>"))?;
                Request::SendMessage {
                    to: to.to_string(),
                    text: text.to_string(),
                }
            }
            "logout" => Request::Logout,
            "delete" => Request::DeleteUser {
                nickname: single_arg(rest, "delete <nickname>")?,
            },
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(ClientCommand::Request(request))
    }
}

/// Splits off the first word; both halves must be non-empty.
fn split_first(rest: &str) -> Option<(&str, &str)> {
    let (first, tail) = rest.split_once(char::is_whitespace)?;
    let tail = tail.trim();
    (!tail.is_empty()).then_some((first, tail))
}

fn single_arg(rest: &str, usage: &'static str) -> Result<String, CommandParseError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(CommandParseError::Usage(usage));
    }
    Ok(rest.to_string())
}

/// Strips one pair of surrounding double quotes.
fn unquote(text: &str) -> Result<&str, CommandParseError> {
    match text.matches('"').count() {
        0 => Ok(text),
        2 if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') => {
            Ok(text[1..text.len() - 1].trim())
        }
        _ => Err(CommandParseError::UnbalancedQuotes),
    }
}
