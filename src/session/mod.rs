//! One conversation with one Claude Code process
//!
//! A [`Session`] owns the CLI child process. Three background tasks feed it:
//! the stdout pump decodes messages, the stderr pump turns lines into error
//! notifications, and the exit supervisor reaps the process and ends the
//! session. Every path that ends a session funnels into one idempotent
//! transition, so listeners see exactly one end notification.

mod listeners;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::message::{LineFramer, MessageDecoder};
use crate::process::lifecycle::{self, SpawnedProcess};
use crate::process::reader::{ReadEvent, read_lines};
use crate::process::{
    CommandBuilder, OUTPUT_DRAIN_TIMEOUT, ProcessState, RunningProcess, STREAM_CLOSE_GRACE,
    find_cli,
};
use crate::types::identifiers::{SessionId, UpstreamSessionId};
use crate::types::messages::{InputMessage, Message};
use crate::types::options::BridgeOptions;

pub use listeners::{EndHandler, ErrorHandler, MessageHandler, SessionEvent};
pub use state::{SessionInfo, SessionStatus};

use listeners::Listeners;
use state::SessionState;

/// A live conversation backed by a Claude Code process
pub struct Session {
    id: SessionId,
    work_dir: PathBuf,
    created_at: DateTime<Utc>,
    /// Conversation this session was started with `--resume` on
    resumed_from: Option<UpstreamSessionId>,
    state: Mutex<SessionState>,
    process: tokio::sync::Mutex<ProcessState>,
    kill: CancellationToken,
    exited: watch::Receiver<bool>,
    listeners: Listeners,
    /// Connection whose handlers are registered, if any
    owner: Mutex<Option<u64>>,
    terminate_timeout: Duration,
    max_line_bytes: usize,
}

impl Session {
    /// Spawn a Claude Code process in `work_dir` and start a session on it
    ///
    /// `work_dir` is used as given; callers validate it first. When `resume`
    /// is set the CLI continues that upstream conversation.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `BridgeError::CliNotFound` if no CLI is configured or found,
    /// and `BridgeError::Spawn` if the process cannot be started
    pub fn spawn(
        work_dir: PathBuf,
        resume: Option<UpstreamSessionId>,
        options: &BridgeOptions,
    ) -> Result<Arc<Self>> {
        let (exited_tx, exited_rx) = watch::channel(false);
        let now = Utc::now();
        let mut session = Self {
            id: SessionId::generate(),
            work_dir,
            created_at: now,
            resumed_from: resume,
            state: Mutex::new(SessionState::new(now)),
            process: tokio::sync::Mutex::new(ProcessState::NotStarted),
            kill: CancellationToken::new(),
            exited: exited_rx,
            listeners: Listeners::default(),
            owner: Mutex::new(None),
            terminate_timeout: options.terminate_timeout,
            max_line_bytes: options.max_line_bytes,
        };

        let cli_path = match options.cli_path {
            Some(ref path) => path.clone(),
            None => find_cli()?,
        };
        let cmd = CommandBuilder::new(&cli_path, &session.work_dir, options)
            .resume(session.resumed_from.as_ref())
            .build();
        let SpawnedProcess {
            child,
            stdin,
            stdout,
            stderr,
        } = lifecycle::spawn(cmd)?;

        let pid = child.id();
        *session.process.get_mut() = ProcessState::Running(RunningProcess::new(stdin, pid));
        session.state.get_mut().status = SessionStatus::Active;

        let session = Arc::new(session);
        log::info!(
            "Session {} started in {} (pid {pid:?}{})",
            session.id,
            session.work_dir.display(),
            session
                .resumed_from
                .as_ref()
                .map(|u| format!(", resuming {u}"))
                .unwrap_or_default()
        );

        let stdout_task = tokio::spawn(Self::pump_stdout(Arc::clone(&session), stdout));
        let stderr_task = tokio::spawn(Self::pump_stderr(Arc::clone(&session), stderr));
        tokio::spawn(Self::supervise(
            Arc::clone(&session),
            child,
            exited_tx,
            stdout_task,
            stderr_task,
        ));

        Ok(session)
    }

    /// Bridge-local id
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Canonical working directory
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// When the session was created
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Lifecycle status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Whether the session accepts commands
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Last time a user message was sent
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state.lock().last_activity
    }

    /// Upstream conversation id
    ///
    /// The id the CLI reported in its init message wins over the one the
    /// session was resumed from.
    #[must_use]
    pub fn upstream_session_id(&self) -> Option<UpstreamSessionId> {
        self.state
            .lock()
            .observed_upstream
            .clone()
            .or_else(|| self.resumed_from.clone())
    }

    /// Snapshot of the session
    pub async fn info(&self) -> SessionInfo {
        let pid = match &*self.process.lock().await {
            ProcessState::Running(running) => running.pid(),
            ProcessState::NotStarted | ProcessState::Exited => None,
        };
        let state = self.state.lock();
        SessionInfo {
            id: self.id.clone(),
            work_dir: self.work_dir.clone(),
            status: state.status,
            upstream_session_id: state
                .observed_upstream
                .clone()
                .or_else(|| self.resumed_from.clone()),
            pid,
            created_at: self.created_at,
            updated_at: state.updated_at,
            last_activity: state.last_activity,
            pending_permission: state.pending_permission.clone(),
            decode_stats: state.decode_stats,
            dropped_lines: state.dropped_lines,
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a handler for decoded CLI messages
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.listeners.add_message(Arc::new(handler));
    }

    /// Register a handler for error text
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add_error(Arc::new(handler));
    }

    /// Register a handler for the end of the session
    pub fn on_end<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add_end(Arc::new(handler));
    }

    /// Remove every message, error and end handler
    pub fn clear_all_handlers(&self) {
        self.listeners.clear();
    }

    /// Replace every handler with the ones `register` adds, on behalf of `owner`
    ///
    /// Whoever held the session before loses it; its later
    /// [`release_owner`](Self::release_owner) is a no-op.
    pub(crate) fn take_over<F>(&self, owner: u64, register: F)
    where
        F: FnOnce(&Self),
    {
        let mut current = self.owner.lock();
        if let Some(previous) = current.replace(owner) {
            log::debug!("Session {} taken over from connection {previous}", self.id);
        }
        self.listeners.clear();
        register(self);
    }

    /// Drop `owner`'s handlers if it still holds the session
    ///
    /// Returns `false` when another owner took over in the meantime.
    pub(crate) fn release_owner(&self, owner: u64) -> bool {
        let mut current = self.owner.lock();
        if *current != Some(owner) {
            return false;
        }
        *current = None;
        self.listeners.clear();
        true
    }

    pub(crate) fn is_owned_by(&self, owner: u64) -> bool {
        *self.owner.lock() == Some(owner)
    }

    /// Number of registered (message, error, end) handlers
    #[must_use]
    pub fn handler_counts(&self) -> (usize, usize, usize) {
        self.listeners.counts()
    }

    /// Receive every event of this session on a channel
    ///
    /// Backed by ordinary handlers, so [`clear_all_handlers`](Self::clear_all_handlers)
    /// closes the channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let messages = tx.clone();
        self.on_message(move |message| {
            let _ = messages.send(SessionEvent::Message(message.clone()));
        });
        let errors = tx.clone();
        self.on_error(move |error| {
            let _ = errors.send(SessionEvent::Error(error.to_string()));
        });
        self.on_end(move || {
            let _ = tx.send(SessionEvent::Ended);
        });
        rx
    }

    /// Run `hook` once when the session terminates
    ///
    /// Not affected by `clear_all_handlers` or by abort's suppression of the
    /// end notification. Runs immediately if the session already ended.
    pub(crate) fn on_terminated<F>(&self, hook: F)
    where
        F: FnOnce(&SessionId) + Send + 'static,
    {
        self.listeners.add_termination(Box::new(hook));
        if self.status() == SessionStatus::Ended {
            self.listeners.run_termination(&self.id);
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Send a user turn
    ///
    /// # Errors
    /// Returns `SessionNotActive` after the session ended and `Transport` if
    /// the write to the process fails
    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.ensure_active()?;
        {
            let mut state = self.state.lock();
            let now = Utc::now();
            state.last_activity = now;
            state.updated_at = now;
        }
        self.write(InputMessage::user_text(text)).await
    }

    /// Approve the outstanding permission request
    ///
    /// # Errors
    /// Same as [`send_message`](Self::send_message)
    pub async fn approve(&self) -> Result<()> {
        self.answer_permission(true).await
    }

    /// Reject the outstanding permission request
    ///
    /// # Errors
    /// Same as [`send_message`](Self::send_message)
    pub async fn reject(&self) -> Result<()> {
        self.answer_permission(false).await
    }

    /// Answer a tool call the CLI is waiting on
    ///
    /// # Errors
    /// Returns `Validation` for an empty `tool_use_id`, otherwise the same as
    /// [`send_message`](Self::send_message)
    pub async fn respond_to_tool_use(&self, tool_use_id: &str, content: &str) -> Result<()> {
        if tool_use_id.trim().is_empty() {
            return Err(BridgeError::validation("toolUseId must not be empty"));
        }
        self.ensure_active()?;
        self.write(InputMessage::tool_result(tool_use_id, content))
            .await
    }

    /// Kill the process mid-turn
    ///
    /// With `resume` set and an upstream id known, the end notification is
    /// held back and the upstream id returned so the caller can start a
    /// replacement process on the same conversation. Otherwise the session
    /// ends normally and `None` is returned.
    ///
    /// # Errors
    /// Returns `SessionNotActive` if the session already ended
    pub async fn abort(&self, resume: bool) -> Result<Option<UpstreamSessionId>> {
        let resume_with = {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Active {
                return Err(BridgeError::session_not_active(self.id.as_str()));
            }
            let upstream = state
                .observed_upstream
                .clone()
                .or_else(|| self.resumed_from.clone());
            let resume_with = if resume { upstream } else { None };
            state.terminating = true;
            state.suppress_end = resume_with.is_some();
            resume_with
        };

        log::info!("Aborting session {}", self.id);
        self.kill.cancel();
        self.wait_for_exit().await;
        self.finish("aborted");
        Ok(resume_with)
    }

    /// End the session and kill its process
    ///
    /// Idempotent; a second call is a no-op.
    pub async fn end(&self) {
        self.state.lock().terminating = true;
        self.finish("ended");
        self.wait_for_exit().await;
    }

    /// Deliver the end notification an abort held back
    ///
    /// Used when the replacement process could not be started.
    pub fn deliver_suppressed_end(&self) {
        let notify = {
            let mut state = self.state.lock();
            let notify = state.status == SessionStatus::Ended && !state.end_notified;
            if notify {
                state.end_notified = true;
            }
            notify
        };
        if notify {
            self.listeners.emit_end();
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(BridgeError::session_not_active(self.id.as_str()))
        }
    }

    async fn answer_permission(&self, approved: bool) -> Result<()> {
        self.ensure_active()?;
        match self.state.lock().pending_permission.take() {
            Some(id) => log::debug!(
                "Session {}: {} permission request {id}",
                self.id,
                if approved { "approving" } else { "rejecting" }
            ),
            None => log::warn!(
                "Session {}: answering with no outstanding permission request",
                self.id
            ),
        }
        self.write(InputMessage::approval(approved)).await
    }

    /// Serialize and write one line to stdin
    ///
    /// Writes are serialized by the process lock. A failed write breaks the
    /// session: the error is reported once and the session ends.
    async fn write(&self, message: InputMessage) -> Result<()> {
        let line = message.to_line()?;
        let mut process = self.process.lock().await;
        if !self.is_active() {
            return Err(BridgeError::session_not_active(self.id.as_str()));
        }
        let ProcessState::Running(running) = &mut *process else {
            return Err(BridgeError::session_not_active(self.id.as_str()));
        };

        if let Err(e) = running.write_line(line).await {
            *process = ProcessState::Exited;
            drop(process);
            let error = format!("Failed to write to Claude Code: {e}");
            log::error!("Session {}: {error}", self.id);
            self.report_error(&error);
            self.finish("stdin write failed");
            return Err(BridgeError::transport(error));
        }
        Ok(())
    }

    fn handle_message(&self, message: &Message) {
        {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Ended {
                return;
            }
            state.updated_at = Utc::now();
            if let Some(upstream) = message.init_session_id()
                && state.observed_upstream.is_none()
            {
                log::info!("Session {} is upstream conversation {upstream}", self.id);
                state.observed_upstream = Some(upstream.clone());
            }
            if let Message::PermissionRequest { id, .. } = message
                && let Some(previous) = state.pending_permission.replace(id.clone())
            {
                log::warn!(
                    "Session {}: permission request {id} replaces unanswered {previous}",
                    self.id
                );
            }
        }
        self.listeners.emit_message(message);
    }

    fn report_error(&self, error: &str) {
        if self.status() == SessionStatus::Ended {
            log::debug!("Session {} (ended): {error}", self.id);
            return;
        }
        self.listeners.emit_error(error);
    }

    /// The single transition into `Ended`
    ///
    /// Returns false if the session had already ended.
    fn finish(&self, reason: &str) -> bool {
        let notify = {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Ended {
                return false;
            }
            state.status = SessionStatus::Ended;
            state.updated_at = Utc::now();
            state.pending_permission = None;
            let notify = !state.suppress_end;
            state.end_notified = notify;
            notify
        };

        log::info!("Session {} ended ({reason})", self.id);
        self.kill.cancel();
        self.listeners.run_termination(&self.id);
        if notify {
            self.listeners.emit_end();
        }
        true
    }

    /// Wait until the supervisor has reaped the process
    async fn wait_for_exit(&self) -> bool {
        let mut exited = self.exited.clone();
        let waited = tokio::time::timeout(self.terminate_timeout, exited.wait_for(|e| *e)).await;
        let reaped = matches!(waited, Ok(Ok(_)));
        if !reaped {
            log::warn!(
                "Session {}: process not reaped within {:?}",
                self.id,
                self.terminate_timeout
            );
        }
        reaped
    }

    async fn pump_stdout(session: Arc<Self>, mut stdout: ChildStdout) {
        let mut framer = LineFramer::new(session.max_line_bytes);
        let mut decoder = MessageDecoder::new();
        let result = read_lines(
            &mut stdout,
            &mut framer,
            session.max_line_bytes,
            |event| match event {
                ReadEvent::Line(line) => {
                    if let Some(message) = decoder.decode(&line) {
                        session.handle_message(&message);
                    }
                    session.state.lock().decode_stats = decoder.stats();
                }
                ReadEvent::Overflow(limit) => {
                    session.state.lock().dropped_lines += 1;
                    session.report_error(&format!(
                        "Dropped a Claude Code output line longer than {limit} bytes"
                    ));
                }
            },
        )
        .await;
        if let Err(e) = result {
            log::warn!("Session {}: stdout read failed: {e}", session.id);
        }

        // stdout closing while the process lives means it can no longer talk to us
        let mut exited = session.exited.clone();
        let exited_in_time =
            tokio::time::timeout(STREAM_CLOSE_GRACE, exited.wait_for(|e| *e)).await;
        if !matches!(exited_in_time, Ok(Ok(_))) {
            log::warn!(
                "Session {}: stdout closed but process still running, killing it",
                session.id
            );
            session.kill.cancel();
        }
    }

    async fn pump_stderr(session: Arc<Self>, mut stderr: ChildStderr) {
        let mut framer = LineFramer::new(session.max_line_bytes);
        let result = read_lines(
            &mut stderr,
            &mut framer,
            session.max_line_bytes,
            |event| match event {
                ReadEvent::Line(line) => {
                    log::debug!("Session {} stderr: {line}", session.id);
                    session.report_error(line.trim_end());
                }
                ReadEvent::Overflow(limit) => {
                    session.report_error(&format!(
                        "Dropped a Claude Code stderr line longer than {limit} bytes"
                    ));
                }
            },
        )
        .await;
        if let Err(e) = result {
            log::debug!("Session {}: stderr read failed: {e}", session.id);
        }
    }

    async fn supervise(
        session: Arc<Self>,
        child: tokio::process::Child,
        exited: watch::Sender<bool>,
        stdout_task: JoinHandle<()>,
        stderr_task: JoinHandle<()>,
    ) {
        let status = lifecycle::supervise(child, session.kill.clone()).await;
        let _ = exited.send(true);
        *session.process.lock().await = ProcessState::Exited;

        // let the pumps deliver whatever the process wrote before exiting
        let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        })
        .await;
        if drained.is_err() {
            log::warn!("Session {}: output not drained after exit", session.id);
        }

        let expected = session.state.lock().terminating;
        match status {
            Ok(status) if !status.success() && !expected => {
                session.report_error(&lifecycle::describe_exit(status));
            }
            Ok(status) => log::debug!("Session {}: process exited ({status})", session.id),
            Err(e) => {
                log::error!("Session {}: failed to wait for process: {e}", session.id);
                if !expected {
                    session.report_error(&format!("Lost track of Claude Code process: {e}"));
                }
            }
        }
        session.finish("process exited");
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.state.lock().last_activity = at;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("work_dir", &self.work_dir)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
