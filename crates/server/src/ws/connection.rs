//! WebSocket connection management
//!
//! Represents an active WebSocket connection owned by one participant.

use tokio::sync::mpsc;
use uuid::Uuid;

use koinonia_shared::ServerEvent;

/// An active WebSocket connection
///
/// Room membership lives in the [`RoomRegistry`](super::registry::RoomRegistry),
/// which holds the connection behind an `Arc`; the socket pump holds the other
/// reference.
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Participant name this connection authenticated as
    pub name: String,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    pub fn new(name: impl Into<String>, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            name: name.into(),
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }
}
