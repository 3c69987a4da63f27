//! File transfer pipeline
//!
//! Uploads go up as multipart form data and come back as an attachment
//! descriptor. Downloads stream with progress reported as a fraction of the
//! total when the size is known, and support cancellation; bytes only reach
//! the destination file after the stream completes, so a cancelled download
//! never leaves a partial file behind.

use futures::StreamExt;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::watch;

use koinonia_shared::FileAttachment;

use crate::error::ClientError;

/// Transfer progress snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub transferred: u64,
    /// Total size when the server reported one; progress is indeterminate
    /// otherwise
    pub total: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, or `None` while indeterminate
    pub fn fraction(&self) -> Option<f32> {
        self.total
            .filter(|total| *total > 0)
            .map(|total| (self.transferred as f32 / total as f32).min(1.0))
    }
}

/// Cancels an in-flight transfer
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Create a cancellation pair; hand the receiver to [`TransferClient::download`]
pub fn cancellation() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), rx)
}

pub struct TransferClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_attachment: FileAttachment,
}

impl TransferClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Upload raw bytes as a named file; failures are user-retriable
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<FileAttachment, ClientError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/chat/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UploadRejected(format!("{status}: {body}")));
        }

        let upload: UploadResponse = response.json().await?;
        tracing::debug!(
            file_ref = %upload.file_attachment.file_ref,
            kind = upload.file_attachment.file_kind.as_str(),
            "Upload accepted"
        );
        Ok(upload.file_attachment)
    }

    /// Upload a file from disk
    pub async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<FileAttachment, ClientError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment.bin".to_string());
        let bytes = tokio::fs::read(path).await?;
        self.upload_bytes(&file_name, mime_type, bytes).await
    }

    /// Stream a stored blob to `dest`
    ///
    /// Every received chunk publishes a [`Progress`] snapshot. On
    /// cancellation the buffered bytes are discarded and `dest` is untouched.
    pub async fn download(
        &self,
        file_ref: &str,
        dest: &Path,
        progress: &watch::Sender<Progress>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<u64, ClientError> {
        if *cancel.borrow() {
            return Err(ClientError::Cancelled);
        }

        let response = self
            .http
            .get(format!("{}/chat/files/{}", self.base_url, file_ref))
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        let _ = progress.send(Progress {
            transferred: 0,
            total,
        });

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut cancellable = true;

        loop {
            tokio::select! {
                changed = cancel.changed(), if cancellable => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            tracing::debug!(file_ref = %file_ref, "Download cancelled; discarding partial bytes");
                            return Err(ClientError::Cancelled);
                        }
                        Ok(()) => {}
                        // Handle dropped: no cancellation can arrive anymore
                        Err(_) => cancellable = false,
                    }
                }
                chunk = stream.next() => match chunk {
                    Some(chunk) => {
                        let chunk = chunk?;
                        buffer.extend_from_slice(&chunk);
                        let _ = progress.send(Progress {
                            transferred: buffer.len() as u64,
                            total,
                        });
                    }
                    None => break,
                },
            }
        }

        tokio::fs::write(dest, &buffer).await?;
        Ok(buffer.len() as u64)
    }
}
