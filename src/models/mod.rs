use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tempfile::NamedTempFile;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

/// Byte stream handed from the orchestrator to a storage backend
pub type FileReader = Box<dyn AsyncRead + Unpin + Send>;

/// Where the bytes of an incoming file live until they are stored
pub enum FileBody {
    Memory(Bytes),
    /// Multipart part streamed to disk; removed when dropped
    Spooled(NamedTempFile),
}

/// One file part of an upload request
pub struct IncomingFile {
    pub filename: String,
    pub declared_size: u64,
    /// Content type claimed by the client. Logged, never trusted.
    pub content_type: Option<String>,
    body: FileBody,
}

impl IncomingFile {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            declared_size: data.len() as u64,
            content_type,
            body: FileBody::Memory(data),
        }
    }

    pub fn spooled(
        filename: impl Into<String>,
        content_type: Option<String>,
        declared_size: u64,
        temp_file: NamedTempFile,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_size,
            content_type,
            body: FileBody::Spooled(temp_file),
        }
    }

    /// Opens a fresh reader positioned at the first byte
    pub async fn open(&self) -> std::io::Result<FileReader> {
        match &self.body {
            FileBody::Memory(data) => Ok(Box::new(Cursor::new(data.clone()))),
            FileBody::Spooled(temp_file) => {
                let file = tokio::fs::File::open(temp_file.path()).await?;
                Ok(Box::new(file))
            }
        }
    }
}

impl std::fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("filename", &self.filename)
            .field("declared_size", &self.declared_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Files of one multipart payload, in the order they were sent
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub files: Vec<IncomingFile>,
    pub use_remote_storage: bool,
}

/// Individual upload result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    #[serde(rename = "orig")]
    pub original_name: String,
    /// Local path or object URL
    #[serde(rename = "dest")]
    pub destination: String,
    pub mime_type: String,
}

/// The single JSON document returned for every upload request.
///
/// `results` is only present on success.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub results: Option<Vec<UploadResult>>,
    pub status: u16,
}

impl UploadResponse {
    pub fn success(results: Vec<UploadResult>, use_remote_storage: bool) -> Self {
        Self {
            message: "Files saved".to_string(),
            context: vec!["Use S3".to_string(), use_remote_storage.to_string()],
            results: Some(results),
            status: StatusCode::CREATED.as_u16(),
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            message: message.into(),
            context,
            results: None,
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for UploadResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
