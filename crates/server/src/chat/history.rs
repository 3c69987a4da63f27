//! Append-only message history
//!
//! Persistence is best-effort by contract: the broker logs append failures
//! and keeps delivering. Retrieval is capped: callers never get the full
//! log, only the most recent slice in ascending `created_at` order.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use koinonia_shared::{ChatError, DeliveryStatus, Message, MessageBody, RoomId};

/// Hard cap on a single history fetch
pub const HISTORY_FETCH_CAP: usize = 100;

/// Append-only persistent log of messages per room
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one message; failures are the caller's to log, not retry
    async fn append(&self, message: &Message) -> Result<(), ChatError>;

    /// Most recent messages for a room, ascending by `created_at`,
    /// never more than [`HISTORY_FETCH_CAP`] entries
    async fn recent(&self, room: &RoomId, limit: usize) -> Result<Vec<Message>, ChatError>;
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Memory-backed history, used when no database is configured and in tests
#[derive(Default)]
pub struct MemoryHistoryStore {
    rooms: RwLock<HashMap<RoomId, Vec<Message>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, message: &Message) -> Result<(), ChatError> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(message.room.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn recent(&self, room: &RoomId, limit: usize) -> Result<Vec<Message>, ChatError> {
        let limit = limit.min(HISTORY_FETCH_CAP);
        let rooms = self.rooms.read().await;
        let Some(messages) = rooms.get(room) else {
            return Ok(Vec::new());
        };
        let mut recent: Vec<Message> = messages
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect();
        recent.sort_by_key(|m| m.created_at);
        Ok(recent)
    }
}

// =============================================================================
// Postgres backend
// =============================================================================

/// Postgres-backed history
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Connect and make sure the `chat_messages` table exists
    ///
    /// Pool limits stay conservative; history writes are fire-and-forget and
    /// never worth starving the rest of the platform's connections.
    pub async fn connect(database_url: &str) -> Result<Self, ChatError> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| ChatError::History(e.to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(60))
            .connect_with(options)
            .await
            .map_err(|e| ChatError::History(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id UUID PRIMARY KEY,
                room TEXT NOT NULL,
                sender TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                body JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::History(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chat_messages_room_created_at_idx
             ON chat_messages (room, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::History(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    room: String,
    sender: String,
    status: String,
    body: serde_json::Value,
    created_at: time::OffsetDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let body: MessageBody = serde_json::from_value(row.body)
            .map_err(|e| ChatError::History(format!("corrupt message body: {e}")))?;
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| ChatError::History(format!("unknown status: {}", row.status)))?;
        Ok(Message {
            id: row.id,
            room: RoomId::from(row.room),
            sender: row.sender,
            created_at: row.created_at,
            status,
            body,
        })
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, message: &Message) -> Result<(), ChatError> {
        let body = serde_json::to_value(&message.body)
            .map_err(|e| ChatError::History(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, room, sender, kind, status, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.id)
        .bind(message.room.as_str())
        .bind(&message.sender)
        .bind(message.kind().as_str())
        .bind(message.status.as_str())
        .bind(body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::History(e.to_string()))?;

        Ok(())
    }

    async fn recent(&self, room: &RoomId, limit: usize) -> Result<Vec<Message>, ChatError> {
        let limit = limit.min(HISTORY_FETCH_CAP);

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, room, sender, status, body, created_at
            FROM chat_messages
            WHERE room = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(room.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::History(e.to_string()))?;

        let mut messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}
