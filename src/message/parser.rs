//! Message decoder for Claude Code stream-json output
//!
//! Decoding is total: every line produces either a [`Message`] or a
//! [`SkipReason`], never an error. Lines the bridge cannot route safely are
//! downgraded to [`Message::Raw`] so they still reach the client.

use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::types::messages::{KNOWN_MESSAGE_TYPES, Message};

/// Why a line produced no message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing but whitespace
    Empty,
    /// Looked like JSON but failed to parse
    Syntax(String),
    /// Valid JSON without a `type` discriminator
    MissingType,
}

/// Result of decoding one line
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A message to dispatch
    Message(Message),
    /// Nothing to dispatch
    Skipped(SkipReason),
}

impl DecodeOutcome {
    /// The decoded message, if any
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Skipped(_) => None,
        }
    }
}

/// Parse a JSON value into a typed Message
///
/// # Arguments
/// * `data` - Raw JSON value from CLI output
///
/// # Errors
/// Returns `BridgeError::MessageParse` if the value does not match any
/// message shape
pub fn parse_message(data: Value) -> Result<Message> {
    serde_json::from_value(data.clone()).map_err(|e| {
        BridgeError::message_parse(format!("Failed to parse message: {e}"), Some(data))
    })
}

/// Decode one complete output line
pub fn decode_line(line: &str) -> DecodeOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return DecodeOutcome::Skipped(SkipReason::Empty);
    }

    // banner text and other CLI chatter
    if !trimmed.starts_with('{') {
        return DecodeOutcome::Message(Message::raw(line));
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            log::error!("Failed to parse CLI output as JSON: {e}");
            return DecodeOutcome::Skipped(SkipReason::Syntax(e.to_string()));
        }
    };

    let Some(message_type) = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
    else {
        log::error!("Dropping CLI output without a type field: {trimmed}");
        return DecodeOutcome::Skipped(SkipReason::MissingType);
    };

    if !KNOWN_MESSAGE_TYPES.contains(&message_type.as_str()) {
        log::warn!("Unknown CLI message type '{message_type}', forwarding as raw text");
        return DecodeOutcome::Message(Message::raw(line));
    }

    match parse_message(value) {
        Ok(message) => DecodeOutcome::Message(message),
        Err(e) => {
            log::warn!("Malformed '{message_type}' message, forwarding as raw text: {e}");
            DecodeOutcome::Message(Message::raw(line))
        }
    }
}

/// Counters kept by a [`MessageDecoder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DecodeStats {
    /// Lines decoded into a typed message
    pub decoded: u64,
    /// Lines forwarded as raw text
    pub raw: u64,
    /// Lines that failed JSON parsing
    pub syntax_errors: u64,
    /// JSON lines without a `type`
    pub untyped: u64,
}

/// Stateful decoder that keeps diagnostics counters
#[derive(Debug, Default)]
pub struct MessageDecoder {
    stats: DecodeStats,
}

impl MessageDecoder {
    /// Create a decoder with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line and update the counters
    pub fn decode(&mut self, line: &str) -> Option<Message> {
        match decode_line(line) {
            DecodeOutcome::Message(message) => {
                if matches!(message, Message::Raw { .. }) {
                    self.stats.raw += 1;
                } else {
                    self.stats.decoded += 1;
                }
                Some(message)
            }
            DecodeOutcome::Skipped(SkipReason::Syntax(_)) => {
                self.stats.syntax_errors += 1;
                None
            }
            DecodeOutcome::Skipped(SkipReason::MissingType) => {
                self.stats.untyped += 1;
                None
            }
            DecodeOutcome::Skipped(SkipReason::Empty) => None,
        }
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> DecodeStats {
        self.stats
    }
}
