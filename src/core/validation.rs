// src/core/validation.rs

//! Field-level format checks for nicknames, full names and message text.

/// Maximum nickname length, in characters.
pub const MAX_NICKNAME_LENGTH: usize = 32;
/// Maximum full name length, in characters.
pub const MAX_FULLNAME_LENGTH: usize = 128;
/// Maximum message text length, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// A nickname is 1 to 32 ASCII letters, digits or underscores. Case-sensitive.
pub fn is_valid_nickname(nickname: &str) -> bool {
    !nickname.is_empty()
        && nickname.len() <= MAX_NICKNAME_LENGTH
        && nickname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A full name is 1 to 128 characters and not blank.
pub fn is_valid_full_name(full_name: &str) -> bool {
    let length = full_name.chars().count();
    length > 0
        && length <= MAX_FULLNAME_LENGTH
        && full_name.chars().any(|c| !c.is_whitespace())
}

pub fn is_valid_message(text: &str) -> bool {
    let length = text.chars().count();
    length > 0 && length <= MAX_MESSAGE_LENGTH
}
