//! Message broker
//!
//! Validates, timestamps, persists, and fans out messages, then drives the
//! delivery status lifecycle. Persistence is best-effort: an append failure
//! is logged and the already-validated message is still broadcast
//! (at-least-once delivery without guaranteed durability).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use koinonia_shared::{
    ChatError, DeliveryStatus, Message, MessageBody, MessageKind, RoomId, ServerEvent,
};

use super::delivery::DeliveryTracker;
use super::history::HistoryStore;
use crate::ws::registry::RoomRegistry;

/// Delay approximating recipient acknowledgement before `delivered`
pub const DEFAULT_DELIVERED_DELAY: Duration = Duration::from_millis(150);

pub struct MessageBroker {
    registry: Arc<RoomRegistry>,
    history: Arc<dyn HistoryStore>,
    tracker: Arc<DeliveryTracker>,
    /// Serializes the stamp/persist/broadcast path per room (FIFO per room,
    /// no ordering across rooms)
    order_locks: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
    delivered_delay: Duration,
}

impl MessageBroker {
    pub fn new(registry: Arc<RoomRegistry>, history: Arc<dyn HistoryStore>) -> Self {
        Self::with_delivered_delay(registry, history, DEFAULT_DELIVERED_DELAY)
    }

    pub fn with_delivered_delay(
        registry: Arc<RoomRegistry>,
        history: Arc<dyn HistoryStore>,
        delivered_delay: Duration,
    ) -> Self {
        Self {
            registry,
            history,
            tracker: Arc::new(DeliveryTracker::new()),
            order_locks: Mutex::new(HashMap::new()),
            delivered_delay,
        }
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    /// Send a message to a room
    ///
    /// Returns the stamped message as broadcast. Validation failures reject
    /// synchronously with no broadcast and no persistence.
    pub async fn send(
        &self,
        room: &RoomId,
        sender: &str,
        body: MessageBody,
    ) -> Result<Message, ChatError> {
        validate(sender, &body)?;

        let order_lock = self.order_lock(room).await;
        let guard = order_lock.lock().await;

        let message = Message {
            id: Uuid::new_v4(),
            room: room.clone(),
            sender: sender.to_string(),
            created_at: OffsetDateTime::now_utc(),
            status: DeliveryStatus::Sending,
            body,
        };

        // System notices are transient: broadcast only, no history entry,
        // no status lifecycle.
        let tracked = message.kind() != MessageKind::System;
        if tracked {
            if let Err(e) = self.history.append(&message).await {
                tracing::warn!(
                    room = %room,
                    message_id = %message.id,
                    error = %e,
                    "History append failed; message delivered without a replay copy"
                );
            }
            self.tracker.track(message.id).await;
        }

        let outcome = self
            .registry
            .broadcast(
                room,
                ServerEvent::ReceiveMessage {
                    message: message.clone(),
                },
            )
            .await;
        drop(guard);

        if !tracked {
            return Ok(message);
        }

        if outcome.attempted() > 0 && outcome.delivered == 0 {
            // Every subscriber channel was dead: nobody heard the fan-out
            if let Some(status) = self.tracker.fail(message.id).await {
                tracing::warn!(room = %room, message_id = %message.id, "Message failed in fan-out");
                broadcast_status(&self.registry, room, message.id, status).await;
            }
            return Ok(message);
        }

        self.spawn_delivery_driver(room.clone(), message.id);
        Ok(message)
    }

    /// Broadcast a transient system notice (join/leave)
    pub async fn send_system(
        &self,
        room: &RoomId,
        text: impl Into<String>,
    ) -> Result<Message, ChatError> {
        self.send(room, "system", MessageBody::system(text)).await
    }

    /// A recipient reported the message as seen
    pub async fn mark_read(&self, room: &RoomId, message_id: Uuid) {
        if let Some(status) = self.tracker.advance(message_id, DeliveryStatus::Read).await {
            broadcast_status(&self.registry, room, message_id, status).await;
        }
    }

    /// Advance `sending -> sent -> delivered`, re-broadcasting a status-only
    /// update at each accepted transition
    fn spawn_delivery_driver(&self, room: RoomId, message_id: Uuid) {
        let tracker = Arc::clone(&self.tracker);
        let registry = Arc::clone(&self.registry);
        let delivered_delay = self.delivered_delay;
        tokio::spawn(async move {
            if let Some(status) = tracker.advance(message_id, DeliveryStatus::Sent).await {
                broadcast_status(&registry, &room, message_id, status).await;
            }

            tokio::time::sleep(delivered_delay).await;
            if let Some(status) = tracker.advance(message_id, DeliveryStatus::Delivered).await {
                broadcast_status(&registry, &room, message_id, status).await;
            }
        });
    }

    async fn order_lock(&self, room: &RoomId) -> Arc<Mutex<()>> {
        let mut locks = self.order_locks.lock().await;
        Arc::clone(locks.entry(room.clone()).or_default())
    }
}

async fn broadcast_status(
    registry: &RoomRegistry,
    room: &RoomId,
    message_id: Uuid,
    status: DeliveryStatus,
) {
    registry
        .broadcast(
            room,
            ServerEvent::MessageStatus {
                room: room.clone(),
                message_id,
                status,
            },
        )
        .await;
}

/// Reject empty senders and empty bodies for content-bearing kinds
fn validate(sender: &str, body: &MessageBody) -> Result<(), ChatError> {
    if sender.trim().is_empty() {
        return Err(ChatError::Validation(
            "message sender must not be empty".to_string(),
        ));
    }
    match body {
        MessageBody::Text { text } | MessageBody::System { text } => {
            if text.trim().is_empty() {
                return Err(ChatError::Validation(
                    "text message body must not be empty".to_string(),
                ));
            }
        }
        MessageBody::Voice { audio_ref, .. } => {
            if audio_ref.is_empty() {
                return Err(ChatError::Validation(
                    "voice message must carry an audio reference".to_string(),
                ));
            }
        }
        MessageBody::File { attachment } => {
            if attachment.file_ref.is_empty() || attachment.file_name.is_empty() {
                return Err(ChatError::Validation(
                    "file message must carry a stored attachment".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::MemoryHistoryStore;
    use crate::ws::connection::Connection;
    use koinonia_shared::Participant;
    use tokio::sync::mpsc;

    async fn broker_with_room(
        room: &RoomId,
        names: &[&str],
    ) -> (
        Arc<MessageBroker>,
        Arc<RoomRegistry>,
        Arc<MemoryHistoryStore>,
        Vec<mpsc::UnboundedReceiver<ServerEvent>>,
    ) {
        let registry = Arc::new(RoomRegistry::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let broker = Arc::new(MessageBroker::with_delivered_delay(
            Arc::clone(&registry),
            Arc::clone(&history) as Arc<dyn HistoryStore>,
            Duration::from_millis(10),
        ));

        let mut receivers = Vec::new();
        for name in names {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let conn = Arc::new(Connection::new(*name, tx));
            let participant = Participant {
                name: name.to_string(),
                avatar_ref: String::new(),
                connection_id: conn.session_id,
                joined_at: OffsetDateTime::now_utc(),
            };
            registry.join(room, participant, conn).await;
            // Drop the join-time presence events so tests see message traffic only
            while rx.try_recv().is_ok() {}
            receivers.push(rx);
        }
        (broker, registry, history, receivers)
    }

    fn received_messages(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::ReceiveMessage { message } = event {
                messages.push(message);
            }
        }
        messages
    }

    #[tokio::test]
    async fn test_send_broadcasts_to_all_including_sender() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, mut rxs) = broker_with_room(&room, &["Alice", "Bob"]).await;

        let sent = broker
            .send(&room, "Alice", MessageBody::text("Hello"))
            .await
            .unwrap();

        for rx in &mut rxs {
            let messages = received_messages(rx);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].id, sent.id);
            assert_eq!(messages[0].body, MessageBody::text("Hello"));
        }
    }

    #[tokio::test]
    async fn test_validation_rejects_without_side_effects() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, history, mut rxs) = broker_with_room(&room, &["Alice"]).await;

        let result = broker.send(&room, "Alice", MessageBody::text("   ")).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));

        let result = broker.send(&room, "", MessageBody::text("hi")).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));

        assert!(received_messages(&mut rxs[0]).is_empty());
        assert!(history.recent(&room, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voice_without_audio_ref_rejected() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, _rxs) = broker_with_room(&room, &["Alice"]).await;

        let body = MessageBody::Voice {
            audio_ref: String::new(),
            duration_seconds: 1.0,
            waveform: vec![0.5],
        };
        assert!(matches!(
            broker.send(&room, "Alice", body).await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, mut rxs) = broker_with_room(&room, &["Alice", "Bob"]).await;

        for i in 0..20 {
            broker
                .send(&room, "Alice", MessageBody::text(format!("m{i}")))
                .await
                .unwrap();
        }

        let bodies: Vec<MessageBody> = received_messages(&mut rxs[1])
            .into_iter()
            .map(|m| m.body)
            .collect();
        let expected: Vec<MessageBody> =
            (0..20).map(|i| MessageBody::text(format!("m{i}"))).collect();
        assert_eq!(bodies, expected);
    }

    #[tokio::test]
    async fn test_status_progresses_without_skipping() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, mut rxs) = broker_with_room(&room, &["Alice"]).await;

        let sent = broker
            .send(&room, "Alice", MessageBody::text("Hello"))
            .await
            .unwrap();

        // Wait out the delivered timer
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut statuses = Vec::new();
        while let Ok(event) = rxs[0].try_recv() {
            if let ServerEvent::MessageStatus {
                message_id, status, ..
            } = event
            {
                assert_eq!(message_id, sent.id);
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![DeliveryStatus::Sent, DeliveryStatus::Delivered]
        );
    }

    #[tokio::test]
    async fn test_mark_read_advances_and_broadcasts() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, mut rxs) = broker_with_room(&room, &["Alice"]).await;

        let sent = broker
            .send(&room, "Alice", MessageBody::text("Hello"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        broker.mark_read(&room, sent.id).await;
        assert_eq!(
            broker.tracker().status(sent.id).await,
            Some(DeliveryStatus::Read)
        );

        // A second report is stale and broadcasts nothing further
        while rxs[0].try_recv().is_ok() {}
        broker.mark_read(&room, sent.id).await;
        assert!(rxs[0].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_system_notices_are_transient() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, history, mut rxs) = broker_with_room(&room, &["Alice"]).await;

        let notice = broker.send_system(&room, "Bob joined").await.unwrap();
        let messages = received_messages(&mut rxs[0]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::System);

        // Never persisted, never tracked
        assert!(history.recent(&room, 100).await.unwrap().is_empty());
        assert_eq!(broker.tracker().status(notice.id).await, None);
    }

    #[tokio::test]
    async fn test_dead_room_marks_message_failed() {
        let room = RoomId::from("choir-chat");
        let (broker, _registry, _history, rxs) = broker_with_room(&room, &["Alice"]).await;

        // Close the only subscriber's channel without leaving the room
        drop(rxs);

        let sent = broker
            .send(&room, "Alice", MessageBody::text("anyone there?"))
            .await
            .unwrap();
        assert_eq!(
            broker.tracker().status(sent.id).await,
            Some(DeliveryStatus::Failed)
        );
    }
}
