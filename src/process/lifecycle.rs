//! Lifecycle management for CLI processes (spawn, supervise, kill)

use std::io;
use std::process::ExitStatus;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};

/// A freshly spawned CLI process with its stdio taken apart
pub(crate) struct SpawnedProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn the CLI process
///
/// # Errors
/// Returns `BridgeError::Spawn` if the process cannot be started or a stdio
/// handle is missing
pub(crate) fn spawn(mut cmd: Command) -> Result<SpawnedProcess> {
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            BridgeError::spawn(format!("executable not found: {e}"))
        } else {
            BridgeError::spawn(e.to_string())
        }
    })?;

    let handles = (child.stdin.take(), child.stdout.take(), child.stderr.take());
    let (Some(stdin), Some(stdout), Some(stderr)) = handles else {
        // kill_on_drop takes care of the child
        let _ = child.start_kill();
        return Err(BridgeError::spawn("Failed to get stdio handles"));
    };

    log::debug!("Spawned Claude Code process {:?}", child.id());

    Ok(SpawnedProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Wait for the process to exit, killing it once `kill` fires
///
/// The kill is forceful (SIGKILL on Unix). The process is always reaped
/// before this returns.
pub(crate) async fn supervise(mut child: Child, kill: CancellationToken) -> io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                // already exited between the wait and the kill
                log::debug!("start_kill failed: {e}");
            }
            child.wait().await
        }
    }
}

/// Human-readable description of a non-success exit
#[must_use]
pub(crate) fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Claude Code exited with code {code}"),
        None => format!("Claude Code terminated: {status}"),
    }
}
