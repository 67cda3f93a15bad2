//! Framing and decoding of CLI output

pub mod framing;
pub mod parser;

pub use framing::LineFramer;
pub use parser::{DecodeOutcome, DecodeStats, MessageDecoder, SkipReason, decode_line, parse_message};
