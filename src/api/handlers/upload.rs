use crate::api::error::AppError;
use crate::models::{IncomingFile, UploadRequest, UploadResponse};
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use futures::TryStreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Multipart field carrying the files (repeated)
pub const FILES_FIELD: &str = "files";
/// Checkbox field selecting the remote store
pub const REMOTE_FIELD: &str = "s3";

fn map_multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::MalformedRequest(e.body_text())
    }
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

/// Streams one file part to a temp file in `spool_dir`
async fn spool_field(field: Field<'_>, spool_dir: &Path) -> Result<IncomingFile, AppError> {
    let filename = field.file_name().unwrap_or("unnamed").to_string();
    let content_type = field.content_type().map(|s| s.to_string());

    let temp_file = tempfile::Builder::new()
        .prefix("multipart-")
        .tempfile_in(spool_dir)
        .map_err(|e| AppError::Internal(format!("Unable to create spool file: {}", e)))?;
    let mut temp_file_async = tokio::fs::File::from_std(
        temp_file
            .reopen()
            .map_err(|e| AppError::Internal(format!("Unable to open spool file: {}", e)))?,
    );

    let body_with_io_error = field.map_err(std::io::Error::other);
    let mut reader = StreamReader::new(body_with_io_error);

    let size = tokio::io::copy(&mut reader, &mut temp_file_async)
        .await
        .map_err(|e| {
            // Body errors surface as io::Error wrapping the multipart error
            match e.into_inner() {
                Some(inner) => match inner.downcast::<MultipartError>() {
                    Ok(multipart_err) => map_multipart_error(*multipart_err),
                    Err(other) => AppError::Internal(format!("Unable to spool file: {}", other)),
                },
                None => AppError::Internal("Unable to spool file".to_string()),
            }
        })?;
    temp_file_async
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("Unable to spool file: {}", e)))?;

    Ok(IncomingFile::spooled(filename, content_type, size, temp_file))
}

/// Reads the whole form into an [`UploadRequest`], preserving file order
pub async fn parse_upload_form(
    mut multipart: Multipart,
    spool_dir: &Path,
) -> Result<UploadRequest, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILES_FIELD {
            request.files.push(spool_field(field, spool_dir).await?);
        } else if name == REMOTE_FIELD {
            let text = field.text().await.map_err(map_multipart_error)?;
            request.use_remote_storage = is_checked(&text);
        }
    }

    Ok(request)
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Object, description = "One or more `files` parts plus an optional `s3=on` field", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Files saved", body = UploadResponse),
        (status = 400, description = "Malformed form or unreadable file", body = UploadResponse),
        (status = 413, description = "File or request too large", body = UploadResponse),
        (status = 415, description = "File type not allowed", body = UploadResponse),
        (status = 500, description = "Storage failure", body = UploadResponse)
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<crate::AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadResponse, AppError> {
    let multipart = multipart.map_err(|e| AppError::MalformedRequest(e.body_text()))?;

    let request = parse_upload_form(multipart, &state.upload_service.config().staging_dir).await?;
    state.upload_service.process(request).await
}
