use crate::models::UploadResponse;
use crate::services::storage::StorageError;
use crate::utils::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to retrieve file {filename}: {source}")]
    FileUnavailable {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error for {filename}: {source}")]
    Storage {
        filename: String,
        #[source]
        source: StorageError,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedRequest(_) | AppError::FileUnavailable { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(ValidationError::SizeExceeded { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Validation(ValidationError::TypeNotAllowed { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            AppError::Storage { .. } | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Projects the error onto the response document.
    ///
    /// Internal causes are logged here and kept out of the body.
    pub fn to_response(&self) -> UploadResponse {
        let status = self.status();
        match self {
            AppError::MalformedRequest(msg) => {
                UploadResponse::failure(status, "Unable to parse form", vec![msg.clone()])
            }
            AppError::PayloadTooLarge(msg) => UploadResponse::failure(
                status,
                "Request body exceeds the maximum allowed limit",
                vec![msg.clone()],
            ),
            AppError::FileUnavailable { filename, source } => {
                tracing::warn!("Failed to retrieve file {}: {}", filename, source);
                UploadResponse::failure(status, "Failed to retrieve file", vec![filename.clone()])
            }
            AppError::Validation(e) => UploadResponse::failure(status, e.to_string(), e.context()),
            AppError::Storage { filename, source } => {
                tracing::error!("Storage error for {}: {:?}", filename, source);
                let (message, mut context) = match source {
                    StorageError::SessionSetup(_) => {
                        ("Failed to create storage session", Vec::new())
                    }
                    StorageError::Transfer { key, bucket, .. } => (
                        "Failed to upload file to S3 bucket",
                        vec![key.clone(), bucket.clone()],
                    ),
                    StorageError::Io { context, .. } => (*context, Vec::new()),
                };
                context.insert(0, filename.clone());
                UploadResponse::failure(status, message, context)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                UploadResponse::failure(status, "Internal Server Error", Vec::new())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_response().into_response()
    }
}
