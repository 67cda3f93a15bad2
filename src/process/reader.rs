//! Line pumps for the CLI's output pipes

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::message::LineFramer;

use super::config::READ_CHUNK_SIZE;

/// What a pump hands to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadEvent {
    /// One complete, non-empty line
    Line(String),
    /// A line was dropped for exceeding this many bytes
    Overflow(usize),
}

/// Read `reader` to the end, feeding every framed line to `on_event`
///
/// The trailing unterminated fragment is flushed when the stream closes,
/// including when it closes with an error.
///
/// # Errors
/// Returns the read error that ended the stream early
pub(crate) async fn read_lines<R, F>(
    reader: &mut R,
    framer: &mut LineFramer,
    max_line_bytes: usize,
    mut on_event: F,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(ReadEvent),
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let result = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break Ok(()),
            Ok(n) => {
                let overflows = framer.overflows();
                for line in framer.push(&chunk[..n]) {
                    on_event(ReadEvent::Line(line));
                }
                for _ in overflows..framer.overflows() {
                    on_event(ReadEvent::Overflow(max_line_bytes));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };

    if let Some(line) = framer.finish() {
        on_event(ReadEvent::Line(line));
    }
    result
}
