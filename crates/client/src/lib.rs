//! Koinonia Chat Client
//!
//! Client-side pieces of the chat engine: the gateway connector with bounded
//! automatic reconnection, the voice capture pipeline, and the file transfer
//! pipeline with progress tracking and cancellation.

pub mod capture;
pub mod connector;
pub mod error;
pub mod transfer;

pub use capture::{
    CaptureBackend, CaptureError, CaptureNegotiator, CaptureSession, VoiceRecorder,
};
pub use connector::{ChatClient, ReconnectPolicy, SessionContext};
pub use error::ClientError;
pub use transfer::{cancellation, CancelHandle, Progress, TransferClient};
