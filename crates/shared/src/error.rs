//! Error types shared across the chat engine

use thiserror::Error;

/// Engine-level errors
///
/// Validation errors are rejected synchronously and never broadcast or
/// persisted. History and storage errors are best-effort by contract: the
/// caller logs and carries on.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
