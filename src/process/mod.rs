//! Claude Code CLI subprocess plumbing
//!
//! One process per session, speaking stream-json on stdin and stdout.

mod command;
mod config;
pub(crate) mod lifecycle;
pub(crate) mod reader;

use std::io;

use futures::SinkExt;
use tokio::process::ChildStdin;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};

pub use command::{CommandBuilder, find_cli};
pub use config::{ALLOWED_EXTRA_FLAGS, DANGEROUS_ENV_VARS, DEFAULT_MAX_LINE_BYTES};
pub(crate) use config::{OUTPUT_DRAIN_TIMEOUT, STREAM_CLOSE_GRACE};

/// Where a session's process is in its life
pub(crate) enum ProcessState {
    /// Constructed, spawn not attempted yet
    NotStarted,
    /// Process alive and accepting input
    Running(RunningProcess),
    /// Process gone, or its stdin is broken
    Exited,
}

/// The writable half of a live process
pub(crate) struct RunningProcess {
    stdin: FramedWrite<ChildStdin, LinesCodec>,
    pid: Option<u32>,
}

impl RunningProcess {
    pub(crate) fn new(stdin: ChildStdin, pid: Option<u32>) -> Self {
        Self {
            stdin: FramedWrite::new(stdin, LinesCodec::new()),
            pid,
        }
    }

    pub(crate) const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write one line (the codec appends the newline) and flush
    pub(crate) async fn write_line(&mut self, line: String) -> io::Result<()> {
        self.stdin.send(line).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidData, "line too long")
            }
        })
    }
}
