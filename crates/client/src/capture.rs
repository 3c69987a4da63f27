//! Voice capture pipeline
//!
//! Audio input is acquired through a negotiated interface: an ordered list of
//! capture backends is tried until one opens (a high-level capture API first,
//! then a reduced-constraint variant, then a legacy path). The rest of the
//! engine depends only on [`CaptureBackend`], never on which strategy won.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use koinonia_shared::MessageBody;

/// Number of amplitude samples in a rendered waveform
pub const WAVEFORM_BUCKETS: usize = 32;

/// Floor for reported duration; very short taps never produce zero-length
/// artifacts
pub const MIN_DURATION_SECONDS: f32 = 0.1;

/// Categorized capture failure, surfaced to the user as a non-fatal notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no audio input device available")]
    NoDevice,

    #[error("audio capture not supported by this runtime")]
    Unsupported,
}

/// An open capture session producing chunks of mono samples
#[derive(Debug)]
pub struct CaptureSession {
    pub sample_rate_hz: u32,
    pub chunks: mpsc::UnboundedReceiver<Vec<f32>>,
}

/// One strategy for acquiring an audio input device
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    fn label(&self) -> &'static str;

    async fn open(&self) -> Result<CaptureSession, CaptureError>;
}

/// Tries backends in order; the first to open wins
pub struct CaptureNegotiator {
    backends: Vec<Box<dyn CaptureBackend>>,
}

impl CaptureNegotiator {
    pub fn new(backends: Vec<Box<dyn CaptureBackend>>) -> Self {
        Self { backends }
    }

    /// Open a capture session via the first working backend
    ///
    /// When every backend fails, the error of the first (most capable) one is
    /// reported, as the most meaningful one to show the user.
    pub async fn open(&self) -> Result<CaptureSession, CaptureError> {
        let mut first_error = None;
        for backend in &self.backends {
            match backend.open().await {
                Ok(session) => {
                    tracing::debug!(backend = backend.label(), "Audio capture negotiated");
                    return Ok(session);
                }
                Err(e) => {
                    tracing::debug!(
                        backend = backend.label(),
                        error = %e,
                        "Capture backend unavailable"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(CaptureError::Unsupported))
    }
}

/// Accumulates captured audio until stopped or cancelled
pub struct VoiceRecorder {
    sample_rate_hz: u32,
    samples: Vec<f32>,
}

impl VoiceRecorder {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            samples: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[f32]) {
        self.samples.extend_from_slice(chunk);
    }

    /// Running duration of the accumulated audio
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate_hz as f32
    }

    /// Package the recording as a voice message body
    ///
    /// `audio_ref` is the stored blob reference for the encoded audio. The
    /// waveform is visually plausible, not sample-accurate: peak amplitude
    /// per bucket, normalized to the loudest bucket.
    pub fn finish(self, audio_ref: impl Into<String>) -> MessageBody {
        let duration_seconds = self.duration_seconds().max(MIN_DURATION_SECONDS);
        MessageBody::Voice {
            audio_ref: audio_ref.into(),
            duration_seconds,
            waveform: compute_waveform(&self.samples),
        }
    }

    /// Discard everything recorded so far; no message is produced
    pub fn cancel(self) {
        tracing::debug!(
            samples = self.samples.len(),
            "Voice recording cancelled"
        );
    }
}

/// Drive a recorder from a capture session until the stop signal fires
///
/// Runs as its own task so recording never blocks message send/receive on
/// the same connection. Dropping the stop sender also ends the recording.
pub async fn record(mut session: CaptureSession, mut stop: oneshot::Receiver<()>) -> VoiceRecorder {
    let mut recorder = VoiceRecorder::new(session.sample_rate_hz);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            chunk = session.chunks.recv() => match chunk {
                Some(chunk) => recorder.push_chunk(&chunk),
                None => break, // Device went away; keep what we have
            },
        }
    }
    recorder
}

fn compute_waveform(samples: &[f32]) -> Vec<f32> {
    let mut waveform = vec![0.0f32; WAVEFORM_BUCKETS];
    if samples.is_empty() {
        return waveform;
    }
    let bucket_size = samples.len().div_ceil(WAVEFORM_BUCKETS);
    for (bucket, chunk) in waveform.iter_mut().zip(samples.chunks(bucket_size)) {
        *bucket = chunk.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    }
    let peak = waveform.iter().fold(0.0f32, |acc, &v| acc.max(v));
    if peak > 0.0 {
        for value in &mut waveform {
            *value /= peak;
        }
    }
    waveform
}
