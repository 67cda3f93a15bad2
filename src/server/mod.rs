//! WebSocket front end
//!
//! - `protocol` - Client commands and server events
//! - `connection` - Per-connection session binding
//! - `ws` - axum routes and the socket loop

mod connection;
pub mod protocol;
mod ws;

pub use connection::Connection;
pub use protocol::{ClientCommand, ServerEvent};
pub use ws::{router, serve};
