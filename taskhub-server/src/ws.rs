//! WebSocket endpoints: the global feed and per-project feeds.
//!
//! Each accepted socket is registered with the [`ConnectionRegistry`] and
//! greeted with a `connected` envelope. After that the socket is
//! write-mostly: the server pushes notification envelopes, and inbound
//! text frames are echoed back so clients can probe liveness. A closed or
//! failing socket is unregistered on the way out.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use taskhub_proto::event::Envelope;
use taskhub_proto::project::ProjectId;

use crate::error::ApiError;
use crate::notify;
use crate::server::AppState;

/// Upgrades a connection onto the global feed.
pub async fn global_feed(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, None))
}

/// Upgrades a connection onto one project's feed.
///
/// The project must exist; subscribing to an unknown project is a 404
/// before the upgrade happens.
pub async fn project_feed(
    ws: WebSocketUpgrade,
    Path(project_id): Path<u64>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = ProjectId(project_id);
    state.store.get_project(project_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Some(project_id))))
}

/// Drives one registered WebSocket until either side closes it.
///
/// The connection lifecycle:
/// 1. Register with the connection registry (scoped or global).
/// 2. Send the `connected` greeting envelope.
/// 3. Writer task forwards registry pushes to the socket; reader task
///    echoes inbound text frames.
/// 4. On disconnect, unregister.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, project: Option<ProjectId>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = state.registry.connect(tx, project).await;
    tracing::info!(connection = %id, project = ?project, "websocket connected");

    let greeting = Envelope::new(
        notify::CONNECTED,
        json!({ "connection_id": id.to_string() }),
        project,
    );
    state.registry.send_to(id, &greeting).await;

    // Writer: drain the registry channel into the socket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection = %id, "websocket write failed");
                break;
            }
        }
    });

    // Reader: echo text frames, stop on close.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let echo = Envelope::new(
                        notify::ECHO,
                        json!({ "message": text.as_str() }),
                        project,
                    );
                    reader_state.registry.send_to(id, &echo).await;
                }
                Message::Close(_) => {
                    tracing::info!(connection = %id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.registry.disconnect(id).await;
    tracing::info!(connection = %id, "websocket disconnected");
}
