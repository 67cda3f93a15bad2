//! JSON protocol between the bridge and its WebSocket clients
//!
//! Both directions are objects tagged by `type` in snake_case, with
//! camelCase fields.

use serde::{Deserialize, Serialize};

use crate::types::identifiers::{SessionId, UpstreamSessionId};
use crate::types::messages::Message;

/// Commands a client sends
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Start a session, optionally in `work_dir`
    CreateSession {
        #[serde(default)]
        work_dir: Option<String>,
    },
    /// Send a user turn
    SendMessage { text: String },
    /// Approve the outstanding permission request
    Approve,
    /// Reject the outstanding permission request
    Reject,
    /// Answer a tool call
    RespondToToolUse {
        tool_use_id: String,
        #[serde(default)]
        content: String,
    },
    /// Kill the process mid-turn
    Abort,
    /// End the bound session
    EndSession,
    /// Bind to an existing session
    AttachSession { session_id: SessionId },
    /// Start a session on an existing upstream conversation
    ResumeSession {
        upstream_session_id: UpstreamSessionId,
        #[serde(default)]
        work_dir: Option<String>,
    },
}

/// Events the bridge sends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Greeting sent once per connection
    Connected { version: String },
    SessionCreated {
        session_id: SessionId,
        work_dir: String,
    },
    /// A CLI message, sanitized for the client
    ClaudeMessage {
        message_type: String,
        message: Message,
    },
    Error { message: String },
    SessionEnded,
    SessionAttached { session_id: SessionId },
    SessionResumed {
        session_id: SessionId,
        upstream_session_id: UpstreamSessionId,
        work_dir: String,
    },
    /// The aborted session's conversation continues in `session_id`
    SessionResumedAfterAbort {
        session_id: SessionId,
        upstream_session_id: UpstreamSessionId,
    },
}

impl ServerEvent {
    /// Wrap a CLI message, stripping fields clients don't need
    #[must_use]
    pub fn claude_message(message: &Message) -> Self {
        Self::ClaudeMessage {
            message_type: message.message_type().to_string(),
            message: message.clone().sanitized(),
        }
    }

    /// An error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
