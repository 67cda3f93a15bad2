//! Session state and snapshots

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::message::DecodeStats;
use crate::types::identifiers::{SessionId, UpstreamSessionId};

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Spawning the process
    Starting,
    /// Process running and accepting input
    Active,
    /// Terminal; never left
    Ended,
}

/// Mutable per-session state, guarded by one lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub status: SessionStatus,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// First `session_id` reported by a `system/init` message
    pub observed_upstream: Option<UpstreamSessionId>,
    /// Permission request waiting for approve/reject
    pub pending_permission: Option<String>,
    /// Set by end and abort so the kill is not reported as a crash
    pub terminating: bool,
    /// Set by a resuming abort; the end notification is held back
    pub suppress_end: bool,
    pub end_notified: bool,
    pub decode_stats: DecodeStats,
    pub dropped_lines: u64,
}

impl SessionState {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Starting,
            updated_at: now,
            last_activity: now,
            observed_upstream: None,
            pending_permission: None,
            terminating: false,
            suppress_end: false,
            end_notified: false,
            decode_stats: DecodeStats::default(),
            dropped_lines: 0,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Bridge-local id
    pub id: SessionId,
    /// Canonical working directory
    pub work_dir: PathBuf,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Conversation id reported by the CLI, or the one it was resumed from
    pub upstream_session_id: Option<UpstreamSessionId>,
    /// Process id while running
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Id of the permission request awaiting an answer
    pub pending_permission: Option<String>,
    /// Output decoding counters
    pub decode_stats: DecodeStats,
    /// Output lines dropped for exceeding the length limit
    pub dropped_lines: u64,
}
