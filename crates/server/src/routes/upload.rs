//! Attachment upload and download endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use serde::Serialize;

use koinonia_shared::{classify_file_kind, FileAttachment};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_attachment: FileAttachment,
}

/// Accept a multipart upload (field `file`), store the blob, and return a
/// descriptor the client can embed in a `file` message
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .unwrap_or("attachment.bin")
            .to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;

        if data.is_empty() {
            return Err(ApiError::Validation(
                "uploaded file must not be empty".to_string(),
            ));
        }

        let file_ref = state.blobs.put(&data).await?;
        let file_kind = classify_file_kind(&mime_type, &file_name);

        tracing::info!(
            file_ref = %file_ref,
            file_name = %file_name,
            size = data.len(),
            kind = file_kind.as_str(),
            "Attachment uploaded"
        );

        return Ok(Json(UploadResponse {
            file_attachment: FileAttachment {
                file_name,
                file_size_bytes: data.len() as u64,
                mime_type,
                file_kind,
                file_ref,
            },
        }));
    }

    Err(ApiError::BadRequest(
        "multipart field 'file' is required".to_string(),
    ))
}

/// Serve a stored blob; clients stream this with progress tracking
pub async fn download(
    State(state): State<AppState>,
    Path(file_ref): Path<String>,
) -> ApiResult<(HeaderMap, Vec<u8>)> {
    let bytes = state
        .blobs
        .get(&file_ref)
        .await
        .map_err(|_| ApiError::NotFound)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(len) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(header::CONTENT_LENGTH, len);
    }
    Ok((headers, bytes))
}
