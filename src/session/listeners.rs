//! Per-session listener registry
//!
//! Handlers are invoked from a snapshot taken outside the lock, so a handler
//! may register or clear handlers on the same session without deadlocking.
//! Clearing during a dispatch affects the next dispatch, not the current one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::identifiers::SessionId;
use crate::types::messages::Message;

/// Handler for decoded CLI messages
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Handler for error text (stderr lines, write failures, crashes)
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Handler for the end of a session
pub type EndHandler = Arc<dyn Fn() + Send + Sync>;

/// Internal hook run once when a session terminates
pub(crate) type TerminationHook = Box<dyn FnOnce(&SessionId) + Send>;

/// Everything a session reports to its listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded CLI message
    Message(Message),
    /// Error text
    Error(String),
    /// The session ended
    Ended,
}

#[derive(Default)]
struct HandlerSet {
    message: Vec<MessageHandler>,
    error: Vec<ErrorHandler>,
    end: Vec<EndHandler>,
}

/// Listener lists for one session
#[derive(Default)]
pub(crate) struct Listeners {
    handlers: Mutex<HandlerSet>,
    termination: Mutex<Vec<TerminationHook>>,
}

impl Listeners {
    pub(crate) fn add_message(&self, handler: MessageHandler) {
        self.handlers.lock().message.push(handler);
    }

    pub(crate) fn add_error(&self, handler: ErrorHandler) {
        self.handlers.lock().error.push(handler);
    }

    pub(crate) fn add_end(&self, handler: EndHandler) {
        self.handlers.lock().end.push(handler);
    }

    /// Drop all user handlers; termination hooks are kept
    pub(crate) fn clear(&self) {
        *self.handlers.lock() = HandlerSet::default();
    }

    /// Number of registered message, error and end handlers
    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        let handlers = self.handlers.lock();
        (
            handlers.message.len(),
            handlers.error.len(),
            handlers.end.len(),
        )
    }

    pub(crate) fn emit_message(&self, message: &Message) {
        let snapshot = self.handlers.lock().message.clone();
        for handler in snapshot {
            handler(message);
        }
    }

    pub(crate) fn emit_error(&self, error: &str) {
        let snapshot = self.handlers.lock().error.clone();
        for handler in snapshot {
            handler(error);
        }
    }

    pub(crate) fn emit_end(&self) {
        let snapshot = self.handlers.lock().end.clone();
        for handler in snapshot {
            handler();
        }
    }

    pub(crate) fn add_termination(&self, hook: TerminationHook) {
        self.termination.lock().push(hook);
    }

    /// Run and consume the termination hooks
    pub(crate) fn run_termination(&self, id: &SessionId) {
        let hooks = std::mem::take(&mut *self.termination.lock());
        for hook in hooks {
            hook(id);
        }
    }
}
