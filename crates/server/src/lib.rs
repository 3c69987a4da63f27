//! Koinonia Chat Server
//!
//! This crate contains the server side of the real-time chat engine:
//! connection gateway, room registry, message broker, delivery tracking,
//! history store, and the attachment endpoints.

pub mod attachment;
pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
