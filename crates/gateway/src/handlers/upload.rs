//! Document upload handler

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::AppState;
use docvault_common::{
    errors::{AppError, Result},
    AuthenticatedTenant,
};

/// Multipart field carrying the document
const FILE_FIELD: &str = "file";

/// Response after indexing a document
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub chunks_count: usize,
    pub file_size_bytes: usize,
    /// False when the embedding provider was down and the document is
    /// searchable by keywords only
    pub embedded: bool,
}

/// Index an uploaded text file into the caller's collection.
///
/// Re-uploading a file name replaces that document's chunks.
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthenticatedTenant,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let limit = state.config.ingestion.max_file_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

        let outcome = state
            .pipeline
            .ingest(&auth.tenant_id, &filename, &bytes)
            .await?;

        return Ok(Json(UploadResponse {
            filename: outcome.document_id,
            chunks_count: outcome.chunks_count,
            file_size_bytes: outcome.file_size_bytes,
            embedded: outcome.embedded,
        }));
    }

    Err(AppError::Validation {
        message: format!("multipart field '{}' is required", FILE_FIELD),
        field: Some(FILE_FIELD.to_string()),
    })
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    let message = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        format!("upload exceeds the limit of {} bytes", limit)
    } else {
        format!("malformed multipart body: {}", err.body_text())
    };
    AppError::Validation {
        message,
        field: Some(FILE_FIELD.to_string()),
    }
}
