//! Delivery status tracking
//!
//! One entry per tracked message. Transition requests that the state machine
//! rejects (backward moves, failing a delivered message) return `None` and
//! leave the recorded status untouched.

use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use koinonia_shared::DeliveryStatus;

/// Tracks the current delivery status of in-flight messages
#[derive(Default)]
pub struct DeliveryTracker {
    statuses: Mutex<HashMap<Uuid, DeliveryStatus>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a message at `sending`
    pub async fn track(&self, message_id: Uuid) {
        let mut statuses = self.statuses.lock().await;
        statuses.insert(message_id, DeliveryStatus::Sending);
    }

    /// Request a transition; returns the new status when accepted, `None`
    /// when the message is unknown or the transition is stale
    pub async fn advance(&self, message_id: Uuid, to: DeliveryStatus) -> Option<DeliveryStatus> {
        let mut statuses = self.statuses.lock().await;
        let current = statuses.get_mut(&message_id)?;
        if !current.can_transition(to) {
            tracing::debug!(
                message_id = %message_id,
                from = current.as_str(),
                to = to.as_str(),
                "Ignored stale delivery transition"
            );
            return None;
        }
        *current = to;
        Some(to)
    }

    /// Mark a message failed; only legal from `sending` or `sent`
    pub async fn fail(&self, message_id: Uuid) -> Option<DeliveryStatus> {
        self.advance(message_id, DeliveryStatus::Failed).await
    }

    /// Current status of a tracked message
    pub async fn status(&self, message_id: Uuid) -> Option<DeliveryStatus> {
        let statuses = self.statuses.lock().await;
        statuses.get(&message_id).copied()
    }
}
