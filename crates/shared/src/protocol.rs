//! Wire protocol for the chat engine
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Both directions derive Serialize and
//! Deserialize so the client crate can speak the same vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::DeliveryStatus;
use crate::message::{Message, MessageBody, Participant, RoomId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room, leaving the current one; rejoining with the same name
    /// replaces the stale presence entry
    JoinRoom { room: RoomId },

    /// Send a message to a room the client has joined
    SendMessage { room: RoomId, body: MessageBody },

    /// Composing-state change; fanned out to everyone in the room except
    /// the sender
    UserTyping { room: RoomId, is_typing: bool },

    /// Recipient reports a message as seen
    MarkRead { room: RoomId, message_id: Uuid },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// New message fan-out; the sender receives its own copy so an
    /// optimistic local echo can be reconciled by id
    ReceiveMessage { message: Message },

    /// Status-only update emitted on each delivery transition
    MessageStatus {
        room: RoomId,
        message_id: Uuid,
        status: DeliveryStatus,
    },

    /// Full presence snapshot, recomputed on every join/leave (never a diff)
    OnlineUsersUpdated {
        room: RoomId,
        participants: Vec<Participant>,
    },

    /// A participant joined the room
    UserJoined { room: RoomId, name: String },

    /// A participant left the room
    UserLeft { room: RoomId, name: String },

    /// A participant's composing state changed
    UserTyping {
        room: RoomId,
        name: String,
        is_typing: bool,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}
