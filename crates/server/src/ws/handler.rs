//! WebSocket handler for Axum
//!
//! Upgrades chat connections, attaches them to rooms, and routes client
//! events to the registry and broker.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use koinonia_shared::{ClientEvent, Participant, RoomId, ServerEvent};

use crate::error::ApiError;
use crate::state::AppState;

use super::connection::Connection;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    name: String,
    room: String,
    avatar: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Identity arrives as query parameters; an empty name or room rejects the
/// upgrade before any socket exists.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ChatQuery>,
) -> Result<Response, ApiError> {
    if params.name.trim().is_empty() {
        return Err(ApiError::Validation(
            "participant name must not be empty".to_string(),
        ));
    }
    if params.room.trim().is_empty() {
        return Err(ApiError::Validation(
            "room must not be empty".to_string(),
        ));
    }

    tracing::info!(name = %params.name, room = %params.room, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, params, state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: ChatQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = Arc::new(Connection::new(params.name.clone(), tx));
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { session_id });

    // Resolve avatar: explicit query value wins, then the member directory,
    // then the deterministic fallback.
    let avatar_ref = match params.avatar.filter(|a| !a.is_empty()) {
        Some(avatar) => avatar,
        None => state.directory.avatar_for(&params.name).await,
    };

    let mut current_room = RoomId::from(params.room);
    join_room(&state, &current_room, &conn, &avatar_ref).await;

    // Spawn task to send events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming events
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else { break };
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::JoinRoom { room }) => {
                    if room == current_room {
                        continue;
                    }
                    leave_room(&state, &current_room, &conn).await;
                    join_room(&state, &room, &conn, &avatar_ref).await;
                    current_room = room;
                }
                Ok(event) => handle_client_event(event, &conn, &state).await,
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        message = %text,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            WsMessage::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            _ => {} // Ignore binary messages
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, name = %conn.name, "WebSocket connection closing");
    leave_room(&state, &current_room, &conn).await;
    send_task.abort();
}

async fn join_room(state: &AppState, room: &RoomId, conn: &Arc<Connection>, avatar_ref: &str) {
    let participant = Participant {
        name: conn.name.clone(),
        avatar_ref: avatar_ref.to_string(),
        connection_id: conn.session_id,
        joined_at: OffsetDateTime::now_utc(),
    };
    state.registry.join(room, participant, Arc::clone(conn)).await;

    if let Err(e) = state
        .broker
        .send_system(room, format!("{} joined the chat", conn.name))
        .await
    {
        tracing::warn!(error = %e, room = %room, "Failed to broadcast join notice");
    }
}

async fn leave_room(state: &AppState, room: &RoomId, conn: &Arc<Connection>) {
    state.registry.leave(room, &conn.name, conn.session_id).await;

    // The notice goes to whoever is left; an empty room drops it silently
    if state.registry.room_size(room).await > 0 {
        if let Err(e) = state
            .broker
            .send_system(room, format!("{} left the chat", conn.name))
            .await
        {
            tracing::warn!(error = %e, room = %room, "Failed to broadcast leave notice");
        }
    }
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, state: &AppState) {
    match event {
        ClientEvent::JoinRoom { .. } => {
            // Room switches are handled in the socket loop, which owns the
            // current-room cursor
        }

        ClientEvent::SendMessage { room, body } => {
            // Senders can only post into a room they are present in
            if !state.registry.contains(&room, &conn.name).await {
                let _ = conn.send(ServerEvent::Error {
                    message: format!("not a participant of {room}"),
                });
                return;
            }
            if let Err(e) = state.broker.send(&room, &conn.name, body).await {
                let _ = conn.send(ServerEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        ClientEvent::UserTyping { room, is_typing } => {
            state
                .registry
                .broadcast_except(
                    &room,
                    conn.session_id,
                    ServerEvent::UserTyping {
                        room: room.clone(),
                        name: conn.name.clone(),
                        is_typing,
                    },
                )
                .await;
        }

        ClientEvent::MarkRead { room, message_id } => {
            state.broker.mark_read(&room, message_id).await;
        }

        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}
