//! Newline framing for CLI output streams
//!
//! The CLI writes one JSON object per line, but pipe reads hand back chunks
//! of arbitrary size. [`LineFramer`] turns those chunks into complete lines.
//! Bytes stay undecoded until their line is complete, so a chunk boundary in
//! the middle of a multi-byte UTF-8 sequence is harmless.

use bytes::{Buf, BytesMut};

/// Accumulates output chunks and yields complete lines
///
/// Invariant: after every [`push`](Self::push) the buffer holds at most one
/// partial line; every newline-terminated prefix has been returned.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    /// Bytes of `buffer` already searched for a newline
    next_index: usize,
    max_line_bytes: usize,
    discarding: bool,
    overflows: u64,
}

impl LineFramer {
    /// Create a framer that drops lines longer than `max_line_bytes`
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            next_index: 0,
            max_line_bytes,
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed one chunk, returning every line it completes
    ///
    /// Lines that are empty after trimming are skipped. A trailing `\r` is
    /// removed so CRLF output frames the same as LF output.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        self.buffer.extend_from_slice(chunk.as_ref());

        let mut lines = Vec::new();
        while let Some(pos) = self.find_newline() {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            self.next_index = 0;

            if self.discarding {
                // tail of an oversized line
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line_bytes {
                log::warn!(
                    "Dropping output line longer than {} bytes",
                    self.max_line_bytes
                );
                self.overflows += 1;
                continue;
            }
            if let Some(line) = decode_line(&line) {
                lines.push(line);
            }
        }

        self.next_index = self.buffer.len();
        if self.discarding {
            self.buffer.clear();
            self.next_index = 0;
        } else if self.buffer.len() > self.max_line_bytes {
            log::warn!(
                "Dropping output line longer than {} bytes",
                self.max_line_bytes
            );
            self.buffer.clear();
            self.next_index = 0;
            self.discarding = true;
            self.overflows += 1;
        }

        lines
    }

    /// Flush the trailing unterminated fragment, if any
    ///
    /// Called once the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&rest)
    }

    fn find_newline(&self) -> Option<usize> {
        self.buffer[self.next_index..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| self.next_index + pos)
    }

    /// Bytes currently buffered for the partial line
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of lines dropped for exceeding the length limit
    #[must_use]
    pub const fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(crate::process::DEFAULT_MAX_LINE_BYTES)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = String::from_utf8_lossy(bytes);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
