//! Message data model shared by the server and client crates

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::attachment::FileAttachment;
use crate::delivery::DeliveryStatus;

// =============================================================================
// Room Identity
// =============================================================================

/// Tenant-scoped room identifier (e.g. `"choir-chat"`)
///
/// Rooms are a partition key, not a stored entity: one exists for as long as
/// it has subscribers or history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Participants
// =============================================================================

/// A connected, named identity within a room
///
/// Owned exclusively by the room's presence set; connections hold only a
/// reference. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Display name, unique within the room (join replaces, never duplicates)
    pub name: String,

    /// Avatar reference resolved at connect time
    pub avatar_ref: String,

    /// Connection that owns this presence entry
    pub connection_id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

// =============================================================================
// Messages
// =============================================================================

/// Message content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
    Voice,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
            MessageKind::Voice => "voice",
            MessageKind::File => "file",
        }
    }
}

/// Message body, tagged by kind
///
/// Flattened into [`Message`] so the wire shape carries `kind` at the top
/// level next to id/sender/status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain text message
    Text { text: String },

    /// Join/leave notice generated by the server; never transitions status
    /// and is never persisted beyond the current session
    System { text: String },

    /// Voice note with a precomputed amplitude waveform for rendering
    Voice {
        audio_ref: String,
        duration_seconds: f32,
        waveform: Vec<f32>,
    },

    /// File attachment descriptor returned by the upload endpoint
    File { attachment: FileAttachment },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::System { .. } => MessageKind::System,
            MessageBody::Voice { .. } => MessageKind::Voice,
            MessageBody::File { .. } => MessageKind::File,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MessageBody::Text { text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        MessageBody::System { text: text.into() }
    }
}

/// A chat message
///
/// `id` is unique within a room; `status` only ever moves forward (see
/// [`DeliveryStatus`]). Created once on send, status-mutated zero to three
/// times, never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room: RoomId,
    pub sender: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: DeliveryStatus,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape_carries_kind() {
        let message = Message {
            id: Uuid::new_v4(),
            room: RoomId::from("choir-chat"),
            sender: "Alice".to_string(),
            created_at: OffsetDateTime::now_utc(),
            status: DeliveryStatus::Sending,
            body: MessageBody::text("Hello"),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "Hello");
        assert_eq!(json["room"], "choir-chat");
        assert_eq!(json["status"], "sending");
    }

    #[test]
    fn test_message_roundtrip() {
        let message = Message {
            id: Uuid::new_v4(),
            room: RoomId::from("anointed-chat"),
            sender: "Bob".to_string(),
            created_at: OffsetDateTime::now_utc(),
            status: DeliveryStatus::Sent,
            body: MessageBody::Voice {
                audio_ref: "blob-1".to_string(),
                duration_seconds: 3.2,
                waveform: vec![0.1, 0.8, 0.4],
            },
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
        assert_eq!(back.kind(), MessageKind::Voice);
    }
}
