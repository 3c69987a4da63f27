//! Room registry and presence tracking
//!
//! Rooms are tenant-scoped broadcast partitions, created lazily on first join
//! and removed when the last subscriber leaves. Each room owns its presence
//! set (participants keyed by name) and subscriber list; the registry's outer
//! lock is the only state shared between rooms, so operations on different
//! rooms never contend beyond the map lookup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use koinonia_shared::{Participant, RoomId, ServerEvent};

use super::connection::Connection;

/// Fan-out accounting for a single broadcast
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastOutcome {
    /// Subscribers the event was handed to
    pub delivered: usize,
    /// Subscribers whose channel was already closed
    pub failed: usize,
}

impl BroadcastOutcome {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Per-room state: presence set plus subscriber connections
#[derive(Default)]
struct RoomState {
    participants: HashMap<String, Participant>,
    subscribers: Vec<Arc<Connection>>,
}

impl RoomState {
    /// Current presence snapshot, ordered by join time for stable rendering
    fn snapshot(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.name.cmp(&b.name)));
        participants
    }

    /// Send to every subscriber; sends are non-blocking, closed channels are
    /// tolerated and counted
    fn send_to_all(&self, event: &ServerEvent) -> BroadcastOutcome {
        self.send_filtered(event, |_| true)
    }

    fn send_filtered(
        &self,
        event: &ServerEvent,
        mut include: impl FnMut(&Connection) -> bool,
    ) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        for conn in &self.subscribers {
            if !include(conn) {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(_) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }
        outcome
    }
}

/// Manages chat rooms for pub/sub and presence
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomState>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a participant and its connection to a room
    ///
    /// Insert-or-replace keyed by name: rejoining with the same name swaps
    /// out the stale presence entry and its old subscriber instead of
    /// duplicating. Broadcasts the updated presence snapshot (to the joiner
    /// too) and a `user_joined` notice.
    pub async fn join(&self, room: &RoomId, participant: Participant, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let state = rooms.entry(room.clone()).or_default();

        let name = participant.name.clone();
        if let Some(previous) = state.participants.insert(name.clone(), participant) {
            state
                .subscribers
                .retain(|c| c.session_id != previous.connection_id);
            tracing::debug!(
                room = %room,
                name = %name,
                "Replaced stale presence entry on rejoin"
            );
        }
        // A reconnecting session id must not end up subscribed twice
        state.subscribers.retain(|c| c.session_id != conn.session_id);
        state.subscribers.push(conn);

        let snapshot = state.snapshot();
        tracing::debug!(
            room = %room,
            name = %name,
            room_size = snapshot.len(),
            "Participant joined room"
        );

        state.send_to_all(&ServerEvent::OnlineUsersUpdated {
            room: room.clone(),
            participants: snapshot,
        });
        state.send_to_all(&ServerEvent::UserJoined {
            room: room.clone(),
            name,
        });
    }

    /// Remove a participant from a room
    ///
    /// The presence entry is only removed when it still belongs to the given
    /// connection. A late leave from a connection that was already replaced
    /// by a rejoin must not evict the fresh entry. Broadcasts the updated
    /// snapshot plus a `user_left` notice to the remaining subscribers.
    pub async fn leave(&self, room: &RoomId, name: &str, connection_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(state) = rooms.get_mut(room) else {
            return;
        };

        let owned = state
            .participants
            .get(name)
            .is_some_and(|p| p.connection_id == connection_id);
        if owned {
            state.participants.remove(name);
        }
        state.subscribers.retain(|c| c.session_id != connection_id);

        if state.subscribers.is_empty() {
            rooms.remove(room);
            tracing::debug!(room = %room, "Removed empty room");
            return;
        }

        if owned {
            let snapshot = state.snapshot();
            tracing::debug!(
                room = %room,
                name = %name,
                room_size = snapshot.len(),
                "Participant left room"
            );
            state.send_to_all(&ServerEvent::OnlineUsersUpdated {
                room: room.clone(),
                participants: snapshot,
            });
            state.send_to_all(&ServerEvent::UserLeft {
                room: room.clone(),
                name: name.to_string(),
            });
        }
    }

    /// Current presence snapshot for a room
    pub async fn snapshot(&self, room: &RoomId) -> Vec<Participant> {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(RoomState::snapshot).unwrap_or_default()
    }

    /// Whether `name` is currently present in `room`
    pub async fn contains(&self, room: &RoomId, name: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .is_some_and(|state| state.participants.contains_key(name))
    }

    /// Broadcast an event to all connections in a room
    pub async fn broadcast(&self, room: &RoomId, event: ServerEvent) -> BroadcastOutcome {
        let rooms = self.rooms.read().await;
        let Some(state) = rooms.get(room) else {
            tracing::debug!(room = %room, "Broadcast to room with no subscribers");
            return BroadcastOutcome::default();
        };
        let outcome = state.send_to_all(&event);
        tracing::debug!(
            room = %room,
            recipients = outcome.delivered,
            failed = outcome.failed,
            "Broadcast event to room"
        );
        outcome
    }

    /// Broadcast to everyone in a room except one connection
    ///
    /// Typing indicators use this: they are never echoed back to their sender.
    pub async fn broadcast_except(
        &self,
        room: &RoomId,
        skip: Uuid,
        event: ServerEvent,
    ) -> BroadcastOutcome {
        let rooms = self.rooms.read().await;
        let Some(state) = rooms.get(room) else {
            return BroadcastOutcome::default();
        };
        state.send_filtered(&event, |conn| conn.session_id != skip)
    }

    /// Get room size (number of subscribers) for a room
    pub async fn room_size(&self, room: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|s| s.subscribers.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
