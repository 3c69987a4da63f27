//! Client-side error types

use thiserror::Error;

/// Errors surfaced by the chat client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection is gone and the bounded reconnect policy is exhausted;
    /// recovering requires a fresh `connect`
    #[error("connection closed")]
    ConnectionClosed,

    #[error("failed to connect after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: usize,
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("invalid server address: {0}")]
    Address(String),

    #[error("transfer failed: {0}")]
    Transfer(#[from] reqwest::Error),

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
