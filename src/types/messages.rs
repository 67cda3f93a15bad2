//! Message-related type definitions
//!
//! This module contains the closed set of messages the CLI emits on stdout
//! in stream-json mode, plus the outbound lines the bridge writes to its
//! stdin.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identifiers::{ToolName, UpstreamSessionId};

// ============================================================================
// Inbound Message Types
// ============================================================================

/// `type` values the decoder routes to a typed variant
pub const KNOWN_MESSAGE_TYPES: &[&str] = &[
    "assistant",
    "user",
    "system",
    "result",
    "thinking",
    "tool_use",
    "tool_result",
    "permission_request",
];

/// Subtype of the system message that carries the upstream session id
pub const SYSTEM_INIT_SUBTYPE: &str = "init";

/// Fields a `tool_use` content block may carry on the wire
const TOOL_USE_FIELDS: &[&str] = &["type", "id", "name", "input"];

/// Fields a `tool_result` content block may carry on the wire
const TOOL_RESULT_FIELDS: &[&str] = &["type", "tool_use_id", "content", "is_error"];

/// Message content: plain text or a list of content blocks
///
/// Blocks stay as JSON values so block kinds the bridge does not know about
/// (images, redacted thinking, ...) pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content
    Text(String),
    /// Structured content blocks
    Blocks(Vec<Value>),
}

impl MessageContent {
    /// Concatenated text of every `text` block (or the plain string)
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect(),
        }
    }

    fn sanitized(self) -> Self {
        match self {
            Self::Text(text) => Self::Text(text),
            Self::Blocks(blocks) => Self::Blocks(blocks.into_iter().map(sanitize_block).collect()),
        }
    }
}

/// Body of an assistant or user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Upstream message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Model that generated the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Message content
    pub content: MessageContent,
}

/// Messages decoded from the CLI's stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Assistant message
    Assistant {
        /// Message body
        message: ChatMessage,
        /// Parent tool use ID for nested conversations
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
        /// Upstream session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<UpstreamSessionId>,
    },
    /// User message echoed back by the CLI (usually tool results)
    User {
        /// Message body
        message: ChatMessage,
        /// Parent tool use ID for nested conversations
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
        /// Upstream session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<UpstreamSessionId>,
    },
    /// System notice
    System {
        /// System message subtype
        subtype: String,
        /// Upstream session ID (always present on `init`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<UpstreamSessionId>,
        /// Every other field, kept opaque
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Extended thinking trace
    Thinking {
        /// Thinking text
        #[serde(alias = "content")]
        thinking: String,
    },
    /// Tool invocation request
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: ToolName,
        /// Tool input parameters
        #[serde(default)]
        input: Value,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this is a result for
        tool_use_id: String,
        /// Whether the tool failed
        #[serde(default)]
        is_error: bool,
        /// Result payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<MessageContent>,
    },
    /// The CLI asks whether a tool may run
    PermissionRequest {
        /// Request ID
        id: String,
        /// Tool that wants to run
        tool_name: ToolName,
        /// Human-readable description of the action
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Tool input, if the CLI sent it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// Terminal result of a turn
    Result {
        /// Result subtype
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        /// Whether the turn failed
        is_error: bool,
        /// Error description
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Final result text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Total duration in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        /// API call duration in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_api_ms: Option<u64>,
        /// Number of conversation turns
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
        /// Total cost in USD
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        /// Upstream session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<UpstreamSessionId>,
    },
    /// A line that is not a well-formed protocol message, kept verbatim
    Raw {
        /// The original line
        text: String,
    },
}

impl Message {
    /// Wrap a line verbatim
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw { text: text.into() }
    }

    /// The wire `type` of this message
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Assistant { .. } => "assistant",
            Self::User { .. } => "user",
            Self::System { .. } => "system",
            Self::Thinking { .. } => "thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::PermissionRequest { .. } => "permission_request",
            Self::Result { .. } => "result",
            Self::Raw { .. } => "raw",
        }
    }

    /// Upstream session id announced by a `system/init` message
    #[must_use]
    pub fn init_session_id(&self) -> Option<&UpstreamSessionId> {
        match self {
            Self::System {
                subtype,
                session_id,
                ..
            } if subtype == SYSTEM_INIT_SUBTYPE => session_id.as_ref(),
            _ => None,
        }
    }

    /// Human-readable text carried by the message, if any
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Assistant { message, .. } | Self::User { message, .. } => {
                Some(message.content.text())
            }
            Self::Thinking { thinking } => Some(thinking.clone()),
            Self::Result { result, error, .. } => result.clone().or_else(|| error.clone()),
            Self::Raw { text } => Some(text.clone()),
            _ => None,
        }
    }

    /// Strip nested tool blocks down to their allow-listed fields
    ///
    /// The CLI attaches bookkeeping fields to `tool_use` and `tool_result`
    /// blocks that must not reach the browser.
    #[must_use]
    pub fn sanitized(self) -> Self {
        match self {
            Self::Assistant {
                mut message,
                parent_tool_use_id,
                session_id,
            } => {
                message.content = message.content.sanitized();
                Self::Assistant {
                    message,
                    parent_tool_use_id,
                    session_id,
                }
            }
            Self::User {
                mut message,
                parent_tool_use_id,
                session_id,
            } => {
                message.content = message.content.sanitized();
                Self::User {
                    message,
                    parent_tool_use_id,
                    session_id,
                }
            }
            Self::ToolResult {
                tool_use_id,
                is_error,
                content,
            } => Self::ToolResult {
                tool_use_id,
                is_error,
                content: content.map(MessageContent::sanitized),
            },
            other => other,
        }
    }
}

/// Rewrite one content block to its allow-listed fields
fn sanitize_block(block: Value) -> Value {
    let Value::Object(mut fields) = block else {
        return block;
    };
    let allowed = match fields.get("type").and_then(Value::as_str) {
        Some("tool_use") => TOOL_USE_FIELDS,
        Some("tool_result") => TOOL_RESULT_FIELDS,
        _ => return Value::Object(fields),
    };
    fields.retain(|key, _| allowed.contains(&key.as_str()));
    Value::Object(fields)
}

// ============================================================================
// Outbound (stdin) Message Types
// ============================================================================

/// A line written to the CLI's stdin
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMessage {
    /// A user turn
    User {
        /// Turn body
        message: UserTurn,
    },
    /// Answer to the outstanding permission request
    Approval {
        /// Whether the tool may run
        approved: bool,
    },
}

/// Body of an outbound user turn
#[derive(Debug, Clone, Serialize)]
pub struct UserTurn {
    /// Always `"user"`
    pub role: &'static str,
    /// Turn content
    pub content: UserTurnContent,
}

/// Content of an outbound user turn
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserTurnContent {
    /// Plain prompt text
    Text(String),
    /// Tool result blocks
    ToolResults(Vec<ToolResultBlock>),
}

/// A `tool_result` block sent back for a confirmation-style tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultBlock {
    /// Always `"tool_result"`
    #[serde(rename = "type")]
    pub block_type: &'static str,
    /// ID of the tool use being answered
    pub tool_use_id: String,
    /// Answer text
    pub content: String,
}

impl InputMessage {
    /// A plain-text user turn
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            message: UserTurn {
                role: "user",
                content: UserTurnContent::Text(text.into()),
            },
        }
    }

    /// A user turn answering one tool use
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::User {
            message: UserTurn {
                role: "user",
                content: UserTurnContent::ToolResults(vec![ToolResultBlock {
                    block_type: "tool_result",
                    tool_use_id: tool_use_id.into(),
                    content: content.into(),
                }]),
            },
        }
    }

    /// A permission decision
    #[must_use]
    pub const fn approval(approved: bool) -> Self {
        Self::Approval { approved }
    }

    /// Serialize to a single JSON line (without the trailing newline)
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_text_line_matches_cli_format() {
        let line = InputMessage::user_text("hello").to_line().unwrap();
        assert_eq!(
            line,
            r#"{"type":"user","message":{"role":"user","content":"hello"}}"#
        );
    }

    #[test]
    fn approval_line_matches_cli_format() {
        assert_eq!(
            InputMessage::approval(false).to_line().unwrap(),
            r#"{"type":"approval","approved":false}"#
        );
    }

    #[test]
    fn tool_result_turn_carries_one_block() {
        let value: Value =
            serde_json::from_str(&InputMessage::tool_result("toolu_1", "yes").to_line().unwrap())
                .unwrap();
        assert_eq!(value["message"]["content"][0]["type"], "tool_result");
        assert_eq!(value["message"]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(value["message"]["content"][0]["content"], "yes");
    }

    #[test]
    fn sanitize_drops_unlisted_tool_fields() {
        let message: Message = serde_json::from_value(json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Reading", "citations": null},
                    {"type": "tool_use", "id": "t1", "name": "Read",
                     "input": {"path": "a"}, "cache_control": {"type": "ephemeral"}}
                ]
            }
        }))
        .unwrap();

        let Message::Assistant { message, .. } = message.sanitized() else {
            panic!("variant changed");
        };
        let MessageContent::Blocks(blocks) = message.content else {
            panic!("content changed");
        };
        assert_eq!(blocks[0]["citations"], Value::Null);
        assert!(blocks[0].as_object().unwrap().contains_key("citations"));
        assert_eq!(
            blocks[1],
            json!({"type": "tool_use", "id": "t1", "name": "Read", "input": {"path": "a"}})
        );
    }

    #[test]
    fn system_keeps_unknown_fields_in_extra() {
        let message: Message = serde_json::from_value(json!({
            "type": "system",
            "subtype": "init",
            "session_id": "abc",
            "cwd": "/tmp",
            "tools": ["Read"]
        }))
        .unwrap();

        assert_eq!(message.init_session_id().map(UpstreamSessionId::as_str), Some("abc"));
        let Message::System { extra, .. } = message else {
            panic!("expected system");
        };
        assert_eq!(extra.get("cwd"), Some(&json!("/tmp")));
        assert!(!extra.contains_key("type"));
        assert!(!extra.contains_key("subtype"));
    }
}
