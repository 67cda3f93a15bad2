//! # Claude Code WebSocket Bridge
//!
//! Exposes the Claude Code CLI to browser and network clients. Each session
//! is one CLI process driven over its stream-json stdin/stdout protocol; a
//! WebSocket connection drives one session at a time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kodegen_claude_bridge::{BridgeOptions, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = BridgeOptions::builder().build();
//!     let addr = options.bind_addr;
//!     let registry = Arc::new(SessionRegistry::new(options));
//!     registry.start_idle_sweep();
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     kodegen_claude_bridge::server::serve(listener, Arc::clone(&registry), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     registry.shutdown_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Driving a Session Directly
//!
//! ```no_run
//! # use kodegen_claude_bridge::{BridgeOptions, SessionEvent, SessionRegistry};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::new(BridgeOptions::default());
//! let session = registry.create_session(None)?;
//! let mut events = session.subscribe();
//!
//! session.send_message("What is 2 + 2?").await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Message(message) => log::info!("{message:?}"),
//!         SessionEvent::Error(error) => log::warn!("{error}"),
//!         SessionEvent::Ended => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Layout
//!
//! - [`message`] - Line framing and message decoding of CLI output
//! - [`process`] - CLI command line and process plumbing
//! - [`session`] - One conversation with one CLI process
//! - [`registry`] - Live sessions, work dir policy, idle sweep, shutdown
//! - [`server`] - WebSocket protocol and axum routes

pub mod error;
pub mod message;
pub mod process;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

pub use error::{BridgeError, Result};
pub use message::{LineFramer, MessageDecoder, decode_line, parse_message};
pub use registry::{AbortOutcome, SessionRegistry, is_valid_work_dir, validate_work_dir};
pub use session::{Session, SessionEvent, SessionInfo, SessionStatus};
pub use types::identifiers::{SessionId, ToolName, UpstreamSessionId};
pub use types::messages::{ChatMessage, InputMessage, Message, MessageContent};
pub use types::options::{BridgeOptions, BridgeOptionsBuilder, PermissionMode};

/// Version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
