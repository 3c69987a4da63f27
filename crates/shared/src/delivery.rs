//! Message delivery-status state machine
//!
//! Statuses move forward through `sending -> sent -> delivered -> read`.
//! `failed` is terminal and reachable only from `sending` or `sent`. Stale
//! transition requests (a late `sent` after `read` was recorded) are ignored,
//! never applied backwards.

use serde::{Deserialize, Serialize};

/// Per-message delivery lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sending" => Some(DeliveryStatus::Sending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    /// Position in the forward progression; `failed` sits outside it
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Sending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Failed => 4,
        }
    }

    /// Whether a transition from `self` to `to` is legal
    ///
    /// Forward moves of any distance are accepted (a recipient may report
    /// `read` before the delivered timer fires); backward moves are not.
    pub fn can_transition(self, to: DeliveryStatus) -> bool {
        match (self, to) {
            (DeliveryStatus::Failed, _) => false,
            (from, DeliveryStatus::Failed) => {
                matches!(from, DeliveryStatus::Sending | DeliveryStatus::Sent)
            }
            (from, to) => to.rank() > from.rank(),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }
}
