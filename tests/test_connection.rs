//! Tests for the per-connection command handling

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ECHO_CLI, install_cli, options_for};
use kodegen_claude_bridge::server::{ClientCommand, Connection, ServerEvent};
use kodegen_claude_bridge::{BridgeOptions, SessionRegistry, SessionStatus};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

struct Client {
    connection: Connection,
    events: UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn connect(registry: &Arc<SessionRegistry>) -> Self {
        let (tx, events) = unbounded_channel();
        let connection = Connection::new(Arc::clone(registry), tx);
        let mut client = Self { connection, events };
        assert!(matches!(
            client.events.try_recv(),
            Ok(ServerEvent::Connected { .. })
        ));
        client
    }

    async fn send(&mut self, json: serde_json::Value) {
        self.connection.handle_text(&json.to_string()).await;
    }

    async fn next(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for a server event")
            .expect("event channel closed")
    }

    async fn until<F>(&mut self, matches: F) -> ServerEvent
    where
        F: Fn(&ServerEvent) -> bool,
    {
        loop {
            let event = self.next().await;
            if matches(&event) {
                return event;
            }
        }
    }

    /// Everything that arrives within `window`
    async fn drain(&mut self, window: Duration) -> Vec<ServerEvent> {
        let mut seen = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(window, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }

    async fn error(&mut self) -> String {
        match self.until(|e| matches!(e, ServerEvent::Error { .. })).await {
            ServerEvent::Error { message } => message,
            _ => unreachable!(),
        }
    }
}

fn setup(options: impl FnOnce(BridgeOptions) -> BridgeOptions) -> (tempfile::TempDir, Arc<SessionRegistry>) {
    let dir = tempfile::tempdir().unwrap();
    let cli = install_cli(dir.path(), ECHO_CLI);
    let registry = Arc::new(SessionRegistry::new(options(options_for(&cli))));
    (dir, registry)
}

fn create(dir: &tempfile::TempDir) -> serde_json::Value {
    serde_json::json!({"type": "create_session", "workDir": dir.path()})
}

#[tokio::test]
async fn test_create_send_and_receive() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);

    client.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, work_dir } = client.next().await else {
        panic!("expected session_created");
    };
    assert_eq!(work_dir, dir.path().canonicalize().unwrap().display().to_string());
    assert!(registry.get_session(&session_id).is_some());

    client
        .send(serde_json::json!({"type": "send_message", "text": "hello"}))
        .await;
    let event = client
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { message_type, .. } if message_type == "assistant"))
        .await;
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "claude_message");
    assert_eq!(json["messageType"], "assistant");
    assert_eq!(json["message"]["message"]["content"][0]["text"], "echo");

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_bad_frames_produce_errors() {
    let (_dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);

    client.connection.handle_text("not json").await;
    assert!(client.error().await.starts_with("Invalid command"));

    client.send(serde_json::json!({"type": "warp_drive"})).await;
    assert!(client.error().await.starts_with("Invalid command"));

    client
        .send(serde_json::json!({"type": "send_message", "text": "hi"}))
        .await;
    assert_eq!(client.error().await, "No active session");
}

#[tokio::test]
async fn test_empty_text_is_rejected() {
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client.send(create(&dir)).await;
    client.next().await;

    client
        .send(serde_json::json!({"type": "send_message", "text": "   "}))
        .await;
    assert!(client.error().await.contains("must not be empty"));

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_invalid_work_dir_is_reported() {
    let (_dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client
        .send(serde_json::json!({"type": "create_session", "workDir": "/tmp/../etc"}))
        .await;
    assert!(client.error().await.starts_with("Invalid working directory"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_disconnect_ends_the_session() {
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, .. } = client.next().await else {
        panic!("expected session_created");
    };
    let session = registry.get_session(&session_id).unwrap();

    client.connection.disconnect().await;
    assert_eq!(session.status(), SessionStatus::Ended);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_detached_session_survives_and_can_be_attached() {
    let (dir, registry) = setup(|o| BridgeOptions {
        detach_on_disconnect: true,
        ..o
    });
    let mut first = Client::connect(&registry);
    first.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, .. } = first.next().await else {
        panic!("expected session_created");
    };
    first.connection.disconnect().await;

    let session = registry.get_session(&session_id).unwrap();
    assert!(session.is_active());
    assert_eq!(session.handler_counts(), (0, 0, 0));

    let mut second = Client::connect(&registry);
    second
        .send(serde_json::json!({"type": "attach_session", "sessionId": session_id}))
        .await;
    assert_eq!(
        second.next().await,
        ServerEvent::SessionAttached {
            session_id: session_id.clone()
        }
    );
    assert_eq!(session.handler_counts(), (1, 1, 1));

    second
        .send(serde_json::json!({"type": "send_message", "text": "still there?"}))
        .await;
    second
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { .. }))
        .await;

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_attach_takes_over_from_another_connection() {
    let (dir, registry) = setup(|o| o);
    let mut first = Client::connect(&registry);
    first.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, .. } = first.next().await else {
        panic!("expected session_created");
    };

    let mut second = Client::connect(&registry);
    second
        .send(serde_json::json!({"type": "attach_session", "sessionId": session_id}))
        .await;
    second.next().await;

    let session = registry.get_session(&session_id).unwrap();
    assert_eq!(session.handler_counts(), (1, 1, 1));

    second
        .send(serde_json::json!({"type": "send_message", "text": "mine now"}))
        .await;
    second
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { .. }))
        .await;
    assert!(first.events.try_recv().is_err());

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_previous_holder_disconnecting_leaves_session_alone() {
    let (dir, registry) = setup(|o| o);
    let mut first = Client::connect(&registry);
    first.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, .. } = first.next().await else {
        panic!("expected session_created");
    };

    let mut second = Client::connect(&registry);
    second
        .send(serde_json::json!({"type": "attach_session", "sessionId": session_id}))
        .await;
    second.next().await;
    assert!(first.connection.bound_session().is_none());

    // the displaced connection cannot drive the session any more
    first
        .send(serde_json::json!({"type": "send_message", "text": "still mine?"}))
        .await;
    assert_eq!(first.error().await, "No active session");

    first.connection.disconnect().await;

    let session = registry.get_session(&session_id).unwrap();
    assert!(session.is_active());
    assert_eq!(session.handler_counts(), (1, 1, 1));
    assert_eq!(
        second.connection.bound_session().map(|s| s.status()),
        Some(SessionStatus::Active)
    );

    second
        .send(serde_json::json!({"type": "send_message", "text": "hello"}))
        .await;
    second
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { message_type, .. } if message_type == "assistant"))
        .await;

    second.send(serde_json::json!({"type": "end_session"})).await;
    second.until(|e| *e == ServerEvent::SessionEnded).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_attach_unknown_session() {
    let (_dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client
        .send(serde_json::json!({"type": "attach_session", "sessionId": "ghost"}))
        .await;
    assert_eq!(client.error().await, "Session not found: ghost");
}

#[tokio::test]
async fn test_end_session_then_commands_fail() {
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client.send(create(&dir)).await;
    client.next().await;

    client.send(serde_json::json!({"type": "end_session"})).await;
    assert_eq!(client.next().await, ServerEvent::SessionEnded);
    assert!(client.connection.bound_session().is_none());
    assert!(registry.is_empty());

    client.send(serde_json::json!({"type": "approve"})).await;
    assert_eq!(client.error().await, "No active session");
}

#[tokio::test]
async fn test_abort_resumes_and_rebinds() {
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client.send(create(&dir)).await;
    let ServerEvent::SessionCreated { session_id, .. } = client.next().await else {
        panic!("expected session_created");
    };

    client
        .send(serde_json::json!({"type": "send_message", "text": "hello"}))
        .await;
    client
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { message_type, .. } if message_type == "assistant"))
        .await;
    let original = registry.get_session(&session_id).unwrap();
    assert!(original.upstream_session_id().is_some());

    client.send(serde_json::json!({"type": "abort"})).await;
    let seen = client.drain(Duration::from_millis(500)).await;
    let [
        ServerEvent::SessionResumedAfterAbort {
            session_id: resumed_id,
            upstream_session_id,
        },
    ] = seen.as_slice()
    else {
        panic!("expected only session_resumed_after_abort, got {seen:?}");
    };
    assert_ne!(*resumed_id, session_id);
    assert_eq!(upstream_session_id.as_str(), "upstream-1");
    assert_eq!(
        client.connection.bound_session().map(|s| s.id().clone()),
        Some(resumed_id.clone())
    );
    assert_eq!(original.status(), SessionStatus::Ended);
    assert_eq!(original.handler_counts(), (0, 0, 0));

    client
        .send(serde_json::json!({"type": "send_message", "text": "again"}))
        .await;
    client
        .until(|e| matches!(e, ServerEvent::ClaudeMessage { message_type, .. } if message_type == "assistant"))
        .await;

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_crashed_session_rejects_next_command() {
    let (dir, registry) = setup(|o| o);
    let mut client = Client::connect(&registry);
    client.send(create(&dir)).await;
    client.next().await;

    client
        .send(serde_json::json!({"type": "send_message", "text": "crash"}))
        .await;
    client.until(|e| *e == ServerEvent::SessionEnded).await;

    client
        .send(serde_json::json!({"type": "send_message", "text": "hello?"}))
        .await;
    assert!(client.error().await.ends_with("is not active"));
}
