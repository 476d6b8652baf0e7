// src/core/protocol/line_codec.rs

//! Implements the newline-delimited record framing and the corresponding
//! `Encoder` and `Decoder` for network communication.

use super::message::Envelope;
use crate::core::MessengerError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum size of a single record accepted by the server, excluding the newline.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 8 * 1024;

/// Records sent by the server (e.g. a long `USERS` listing) may exceed the
/// request limit, so clients accept larger ones.
pub const CLIENT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// A `tokio_util::codec` implementation that splits a byte stream into
/// newline-terminated text records and writes [`Envelope`]s as compact JSON lines.
///
/// A trailing `\r` before the newline is stripped and empty records are skipped.
/// A record longer than the configured limit is a `FrameTooLarge` error, which
/// the caller treats as fatal for the connection.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_record_bytes: usize,
    /// Index up to which the buffer has already been scanned for a newline.
    next_index: usize,
}

impl LineCodec {
    pub fn new(max_record_bytes: usize) -> Self {
        Self {
            max_record_bytes,
            next_index: 0,
        }
    }

    pub fn max_record_bytes(&self) -> usize {
        self.max_record_bytes
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_BYTES)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = MessengerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Room for the record itself plus an optional "\r" and the "\n".
            let read_to = std::cmp::min(self.max_record_bytes + 2, src.len());
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match newline {
                Some(offset) => {
                    let newline_index = self.next_index + offset;
                    self.next_index = 0;
                    let record = src.split_to(newline_index + 1);
                    let mut line = &record[..newline_index];
                    if let Some(stripped) = line.strip_suffix(&b"\r"[..]) {
                        line = stripped;
                    }
                    if line.len() > self.max_record_bytes {
                        return Err(MessengerError::FrameTooLarge {
                            limit: self.max_record_bytes,
                        });
                    }
                    if line.is_empty() {
                        continue;
                    }
                    let text = std::str::from_utf8(line).map_err(|_| MessengerError::InvalidUtf8)?;
                    return Ok(Some(text.to_string()));
                }
                None if src.len() > self.max_record_bytes + 1 => {
                    return Err(MessengerError::FrameTooLarge {
                        limit: self.max_record_bytes,
                    });
                }
                None => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    /// A partial record left in the buffer when the peer closes is dropped.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(record) => Ok(Some(record)),
            None => {
                buf.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl<T> Encoder<T> for LineCodec
where
    T: Into<Envelope>,
{
    type Error = MessengerError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let envelope: Envelope = item.into();
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| MessengerError::Internal(format!("failed to encode record: {e}")))?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
