//! HTTP routes and WebSocket handling

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::registry::SessionRegistry;

use super::connection::Connection;
use super::protocol::ServerEvent;

/// Routes: `GET /ws` for clients, `GET /health` for probes
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(registry)
}

/// Serve until `shutdown` resolves
///
/// Sessions are left running; call
/// [`SessionRegistry::shutdown_all`] afterwards.
///
/// # Errors
/// Returns the I/O error that stopped the server
pub async fn serve<F>(
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(State(registry): State<Arc<SessionRegistry>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": registry.len(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<SessionRegistry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(socket: WebSocket, registry: Arc<SessionRegistry>) {
    log::info!("WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("Failed to serialize event: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                log::debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let mut connection = Connection::new(registry, outbound_tx);

    // pings are answered by axum itself
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(WsMessage::Text(text)) => connection.handle_text(text.as_str()).await,
            Ok(WsMessage::Close(_)) => {
                log::debug!("Client sent close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("WebSocket error: {e}");
                break;
            }
        }
    }

    connection.disconnect().await;
    send_task.abort();
    log::info!("WebSocket client disconnected");
}
