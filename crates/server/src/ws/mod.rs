//! WebSocket support for real-time chat
//!
//! Provides the persistent-connection side of the engine:
//! - Per-tenant room partitioning with pub/sub fan-out
//! - Live presence tracking (full snapshots, never diffs)
//! - Typing indicators (fanned out to everyone but the sender)
//!
//! # Architecture
//!
//! - **Connection**: an active WebSocket connection owned by one participant
//! - **Registry**: room-keyed presence sets and subscriber lists
//! - **Handler**: Axum WebSocket route handler and event dispatch

pub mod connection;
pub mod handler;
pub mod registry;

pub use handler::ws_handler;
pub use registry::RoomRegistry;
