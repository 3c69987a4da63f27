//! Koinonia Shared Types
//!
//! This crate contains the wire protocol, message data model, and delivery
//! state machine shared between the chat server and client.

pub mod attachment;
pub mod avatar;
pub mod delivery;
pub mod error;
pub mod message;
pub mod protocol;

pub use attachment::{classify_file_kind, FileAttachment, FileKind};
pub use delivery::DeliveryStatus;
pub use error::ChatError;
pub use message::{Message, MessageBody, MessageKind, Participant, RoomId};
pub use protocol::{ClientEvent, ServerEvent};
