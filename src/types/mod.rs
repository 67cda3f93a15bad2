//! Type definitions for the Claude bridge
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `UpstreamSessionId`, `ToolName`)
//! - [`messages`] - CLI stdout messages and stdin input lines
//! - [`options`] - Bridge configuration

pub mod identifiers;
pub mod messages;
pub mod options;

// Re-export commonly used types
pub use identifiers::{SessionId, ToolName, UpstreamSessionId};
pub use messages::{ChatMessage, InputMessage, Message, MessageContent};
pub use options::{BridgeOptions, BridgeOptionsBuilder, PermissionMode};
