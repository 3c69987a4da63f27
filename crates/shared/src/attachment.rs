//! File attachment descriptors and kind classification

use serde::{Deserialize, Serialize};

/// Broad category of an attached file, used by clients to pick a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Document,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
        }
    }
}

/// Descriptor returned by the upload endpoint and embedded in `file` messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub file_kind: FileKind,
    /// Retrievable blob reference (`GET /chat/files/{file_ref}`)
    pub file_ref: String,
}

/// Classify a file by MIME type first, file extension as a fallback
///
/// Anything unrecognized is a document.
pub fn classify_file_kind(mime_type: &str, file_name: &str) -> FileKind {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("image/") {
        return FileKind::Image;
    }
    if mime.starts_with("video/") {
        return FileKind::Video;
    }
    if mime.starts_with("audio/") {
        return FileKind::Audio;
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" => FileKind::Image,
        "mp4" | "mov" | "avi" | "mkv" | "webm" => FileKind::Video,
        "mp3" | "wav" | "ogg" | "m4a" | "flac" | "aac" => FileKind::Audio,
        _ => FileKind::Document,
    }
}
