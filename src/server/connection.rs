//! One WebSocket client and the session bound to it

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::VERSION;
use crate::error::{BridgeError, Result};
use crate::registry::{AbortOutcome, SessionRegistry};
use crate::session::Session;

use super::protocol::{ClientCommand, ServerEvent};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection state
///
/// At most one session is bound at a time. Binding takes the session over
/// from whichever connection held it, so a session forwards to at most one
/// connection; the connection that lost it can no longer drive or end it.
pub struct Connection {
    id: u64,
    registry: Arc<SessionRegistry>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    bound: Option<Arc<Session>>,
}

impl Connection {
    /// Open a connection and greet the client
    pub fn new(registry: Arc<SessionRegistry>, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        let connection = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            outbound,
            bound: None,
        };
        connection.emit(ServerEvent::Connected {
            version: VERSION.to_string(),
        });
        connection
    }

    /// The session this connection drives
    ///
    /// `None` once another connection attached to it.
    #[must_use]
    pub fn bound_session(&self) -> Option<&Arc<Session>> {
        self.bound
            .as_ref()
            .filter(|session| session.is_owned_by(self.id))
    }

    /// Handle one text frame
    ///
    /// Frames that are not a valid command produce an error event; the
    /// connection stays open.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                log::warn!("Invalid client command: {e}");
                self.emit(ServerEvent::error(format!("Invalid command: {e}")));
            }
        }
    }

    /// Handle one command, reporting failure as an error event
    pub async fn handle(&mut self, command: ClientCommand) {
        if let Err(e) = self.dispatch(command).await {
            log::debug!("Command failed: {e}");
            self.emit(ServerEvent::error(e.to_string()));
        }
    }

    async fn dispatch(&mut self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::CreateSession { work_dir } => {
                self.release().await;
                let session = self
                    .registry
                    .create_session(work_dir.as_deref().map(Path::new))?;
                self.bind(Arc::clone(&session));
                self.emit(ServerEvent::SessionCreated {
                    session_id: session.id().clone(),
                    work_dir: session.work_dir().display().to_string(),
                });
            }
            ClientCommand::ResumeSession {
                upstream_session_id,
                work_dir,
            } => {
                self.release().await;
                let session = self.registry.resume_session(
                    upstream_session_id.clone(),
                    work_dir.as_deref().map(Path::new),
                )?;
                self.bind(Arc::clone(&session));
                self.emit(ServerEvent::SessionResumed {
                    session_id: session.id().clone(),
                    upstream_session_id,
                    work_dir: session.work_dir().display().to_string(),
                });
            }
            ClientCommand::AttachSession { session_id } => {
                let session = self
                    .registry
                    .get_session(&session_id)
                    .ok_or_else(|| BridgeError::session_not_found(session_id.as_str()))?;
                self.unbind();
                self.bind(session);
                self.emit(ServerEvent::SessionAttached { session_id });
            }
            ClientCommand::SendMessage { text } => {
                if text.trim().is_empty() {
                    return Err(BridgeError::validation("text must not be empty"));
                }
                self.active_session()?.send_message(&text).await?;
            }
            ClientCommand::Approve => self.active_session()?.approve().await?,
            ClientCommand::Reject => self.active_session()?.reject().await?,
            ClientCommand::RespondToToolUse {
                tool_use_id,
                content,
            } => {
                self.active_session()?
                    .respond_to_tool_use(&tool_use_id, &content)
                    .await?;
            }
            ClientCommand::Abort => self.abort().await?,
            ClientCommand::EndSession => {
                let session = self
                    .bound_session()
                    .cloned()
                    .ok_or(BridgeError::NoActiveSession)?;
                let ended = self.registry.end_session(session.id()).await;
                self.unbind();
                if !ended {
                    // already gone; its end notification went out earlier
                    self.emit(ServerEvent::SessionEnded);
                }
            }
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        let session = Arc::clone(self.active_session()?);
        match self.registry.abort_session(session.id()).await {
            Ok(AbortOutcome::Resumed {
                session: resumed,
                upstream_session_id,
            }) => {
                self.unbind();
                self.bind(Arc::clone(&resumed));
                self.emit(ServerEvent::SessionResumedAfterAbort {
                    session_id: resumed.id().clone(),
                    upstream_session_id,
                });
                Ok(())
            }
            Ok(AbortOutcome::Ended) => {
                self.unbind();
                Ok(())
            }
            Err(e) => {
                self.unbind();
                Err(e)
            }
        }
    }

    /// The bound session, if it still accepts commands
    fn active_session(&self) -> Result<&Arc<Session>> {
        let session = self.bound_session().ok_or(BridgeError::NoActiveSession)?;
        if session.is_active() {
            Ok(session)
        } else {
            Err(BridgeError::session_not_active(session.id().as_str()))
        }
    }

    /// Forward `session`'s events to this connection
    fn bind(&mut self, session: Arc<Session>) {
        let outbound = &self.outbound;
        session.take_over(self.id, |session| {
            let tx = outbound.clone();
            session.on_message(move |message| {
                let _ = tx.send(ServerEvent::claude_message(message));
            });
            let tx = outbound.clone();
            session.on_error(move |error| {
                let _ = tx.send(ServerEvent::error(error));
            });
            let tx = outbound.clone();
            session.on_end(move || {
                let _ = tx.send(ServerEvent::SessionEnded);
            });
        });

        log::debug!("Connection {} bound to session {}", self.id, session.id());
        self.bound = Some(session);
    }

    /// Stop forwarding; the session keeps running
    ///
    /// Returns the session only if this connection still held it.
    fn unbind(&mut self) -> Option<Arc<Session>> {
        let session = self.bound.take()?;
        if session.release_owner(self.id) {
            Some(session)
        } else {
            log::debug!(
                "Connection {} no longer holds session {}",
                self.id,
                session.id()
            );
            None
        }
    }

    /// Unbind and, unless sessions outlive connections, end the session
    async fn release(&mut self) {
        let Some(session) = self.unbind() else {
            return;
        };
        if self.registry.options().detach_on_disconnect {
            log::debug!("Leaving session {} running", session.id());
        } else {
            self.registry.end_session(session.id()).await;
        }
    }

    /// Tear down after the socket closed
    pub async fn disconnect(mut self) {
        self.release().await;
    }

    fn emit(&self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            log::debug!("Dropping event for a closed connection");
        }
    }
}
