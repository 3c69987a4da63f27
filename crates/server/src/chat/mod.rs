//! Message pipeline: broker, delivery lifecycle, history

pub mod broker;
pub mod delivery;
pub mod history;

pub use broker::MessageBroker;
pub use delivery::DeliveryTracker;
pub use history::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
