//! Session registry
//!
//! Owns every live [`Session`], validates working directories before any
//! process is spawned, ends idle sessions on a timer and terminates
//! everything at shutdown.
//!
//! # Module Structure
//!
//! - `workdir` - Working directory allowlist
//! - `sweep` - Background idle sweep

mod sweep;
pub mod workdir;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::session::{Session, SessionInfo};
use crate::types::identifiers::{SessionId, UpstreamSessionId};
use crate::types::options::BridgeOptions;

use sweep::SweepHandle;

pub use workdir::{default_allowed_roots, is_valid_work_dir, validate_work_dir};

type SessionMap = HashMap<SessionId, Arc<Session>>;

// ============================================================================
// ABORT OUTCOME
// ============================================================================

/// What became of an aborted session
#[derive(Debug)]
pub enum AbortOutcome {
    /// A replacement session continues the same upstream conversation
    Resumed {
        /// The replacement session
        session: Arc<Session>,
        /// Conversation it resumed
        upstream_session_id: UpstreamSessionId,
    },
    /// The session ended; nothing replaced it
    Ended,
}

// ============================================================================
// SESSION REGISTRY
// ============================================================================

/// Map of live sessions plus the policies around them
///
/// A session is listed only between a successful start and its
/// termination; it removes itself when its process exits.
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
    options: BridgeOptions,
    sweep: Mutex<Option<SweepHandle>>,
    sweeping: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            options,
            sweep: Mutex::new(None),
            sweeping: tokio::sync::Mutex::new(()),
        }
    }

    /// Options every session is started with
    #[must_use]
    pub const fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Resolve and validate a requested working directory
    ///
    /// `None` means the user's home directory.
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidWorkDir` if the directory is not allowed
    pub fn resolve_work_dir(&self, requested: Option<&Path>) -> Result<PathBuf> {
        let path = match requested {
            Some(path) => path.to_path_buf(),
            None => dirs::home_dir()
                .ok_or_else(|| BridgeError::invalid_work_dir("no home directory"))?,
        };
        validate_work_dir(&path, &self.options.allowed_roots)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Start a new session
    ///
    /// # Errors
    /// Returns `InvalidWorkDir` before anything is spawned, or the spawn
    /// error; nothing is registered on failure
    pub fn create_session(&self, work_dir: Option<&Path>) -> Result<Arc<Session>> {
        let work_dir = self.resolve_work_dir(work_dir)?;
        self.start_session(work_dir, None)
    }

    /// Start a session that continues an upstream conversation
    ///
    /// # Errors
    /// Same as [`create_session`](Self::create_session), plus `Validation`
    /// for an empty upstream id
    pub fn resume_session(
        &self,
        upstream: UpstreamSessionId,
        work_dir: Option<&Path>,
    ) -> Result<Arc<Session>> {
        if upstream.as_str().trim().is_empty() {
            return Err(BridgeError::validation("upstreamSessionId must not be empty"));
        }
        let work_dir = self.resolve_work_dir(work_dir)?;
        self.start_session(work_dir, Some(upstream))
    }

    fn start_session(
        &self,
        work_dir: PathBuf,
        resume: Option<UpstreamSessionId>,
    ) -> Result<Arc<Session>> {
        let session = Session::spawn(work_dir, resume, &self.options)?;

        let sessions = Arc::downgrade(&self.sessions);
        session.on_terminated(move |id| {
            if let Some(sessions) = sessions.upgrade()
                && sessions.lock().remove(id).is_some()
            {
                log::debug!("Session {id} removed from registry");
            }
        });

        let mut sessions = self.sessions.lock();
        sessions.insert(session.id().clone(), Arc::clone(&session));
        // the process may have died before the insert; the hook found nothing then
        if !session.is_active() {
            sessions.remove(session.id());
        }
        log::info!("Registry holds {} session(s)", sessions.len());
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Look up a live session
    #[must_use]
    pub fn get_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Snapshot of one session
    pub async fn get_session_info(&self, id: &SessionId) -> Option<SessionInfo> {
        let session = self.get_session(id)?;
        Some(session.info().await)
    }

    /// Snapshots of every live session, oldest first
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<_> = self.sessions.lock().values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    /// End a session and remove it
    ///
    /// Returns false, doing nothing, if no such session is live.
    pub async fn end_session(&self, id: &SessionId) -> bool {
        let Some(session) = self.sessions.lock().remove(id) else {
            log::debug!("end_session: {id} not found");
            return false;
        };
        session.end().await;
        true
    }

    /// Abort a session, resuming it on a fresh process when possible
    ///
    /// Resumption needs `auto_resume_on_abort` and a known upstream id. If
    /// the replacement fails to start, the old session's end notification is
    /// delivered and the spawn error returned.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for an unknown id, `SessionNotActive` for an
    /// ended session, or the replacement's spawn error
    pub async fn abort_session(&self, id: &SessionId) -> Result<AbortOutcome> {
        let session = self
            .get_session(id)
            .ok_or_else(|| BridgeError::session_not_found(id.as_str()))?;

        let Some(upstream) = session.abort(self.options.auto_resume_on_abort).await? else {
            return Ok(AbortOutcome::Ended);
        };

        match self.start_session(session.work_dir().to_path_buf(), Some(upstream.clone())) {
            Ok(resumed) => {
                log::info!("Session {id} resumed as {} on {upstream}", resumed.id());
                Ok(AbortOutcome::Resumed {
                    session: resumed,
                    upstream_session_id: upstream,
                })
            }
            Err(e) => {
                log::error!("Failed to resume {upstream} after abort: {e}");
                session.deliver_suppressed_end();
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Idle sweep
    // ------------------------------------------------------------------

    /// Start the periodic idle sweep
    ///
    /// Restarts it if already running. Must be called from within a Tokio
    /// runtime.
    pub fn start_idle_sweep(self: &Arc<Self>) {
        let handle = sweep::spawn(Arc::downgrade(self), self.options.sweep_interval);
        if let Some(previous) = self.sweep.lock().replace(handle) {
            previous.stop();
        }
        log::debug!(
            "Idle sweep every {:?}, timeout {:?}",
            self.options.sweep_interval,
            self.options.idle_timeout
        );
    }

    /// Stop the periodic idle sweep
    pub fn stop_idle_sweep(&self) {
        if let Some(handle) = self.sweep.lock().take() {
            handle.stop();
        }
    }

    /// End every session idle for longer than the idle timeout
    ///
    /// Returns the ids it ended. A call made while another sweep is running
    /// does nothing.
    pub async fn sweep_idle(&self) -> Vec<SessionId> {
        self.sweep_idle_at(Utc::now()).await
    }

    async fn sweep_idle_at(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let Ok(_guard) = self.sweeping.try_lock() else {
            log::debug!("Idle sweep already running");
            return Vec::new();
        };

        let idle_timeout =
            chrono::Duration::from_std(self.options.idle_timeout).unwrap_or(chrono::Duration::MAX);
        let expired: Vec<SessionId> = self
            .sessions
            .lock()
            .values()
            .filter(|session| now.signed_duration_since(session.last_activity()) > idle_timeout)
            .map(|session| session.id().clone())
            .collect();

        let mut ended = Vec::with_capacity(expired.len());
        for id in expired {
            log::info!("Ending idle session {id}");
            if self.end_session(&id).await {
                ended.push(id);
            }
        }
        ended
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// End every session and stop the sweep
    ///
    /// Sessions are ended concurrently; the whole call is bounded by the
    /// shutdown timeout.
    pub async fn shutdown_all(&self) {
        self.stop_idle_sweep();

        let sessions: Vec<Arc<Session>> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        if sessions.is_empty() {
            return;
        }
        log::info!("Shutting down {} session(s)", sessions.len());

        let ends = futures::future::join_all(sessions.iter().map(|session| session.end()));
        if tokio::time::timeout(self.options.shutdown_timeout, ends)
            .await
            .is_err()
        {
            log::warn!(
                "Shutdown did not finish within {:?}",
                self.options.shutdown_timeout
            );
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.get_mut().take() {
            handle.stop();
        }
    }
}
