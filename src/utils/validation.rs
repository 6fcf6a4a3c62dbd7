use crate::config::UploadConfig;
use thiserror::Error;

const FILE_SIZE_UNIT: f64 = 1024.0 * 1024.0;
const FS_UNIT_NAME: &str = "MiB";

/// Why a file was refused before dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size exceeds the limit")]
    SizeExceeded {
        filename: String,
        limit: u64,
        actual: u64,
    },

    #[error("File type not allowed")]
    TypeNotAllowed {
        filename: String,
        allowed: Vec<String>,
        detected: String,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::SizeExceeded { .. } => "FILE_TOO_LARGE",
            ValidationError::TypeNotAllowed { .. } => "INVALID_MIME_TYPE",
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ValidationError::SizeExceeded { filename, .. }
            | ValidationError::TypeNotAllowed { filename, .. } => filename,
        }
    }

    /// Diagnostic pairs returned to the caller
    pub fn context(&self) -> Vec<String> {
        match self {
            ValidationError::SizeExceeded {
                filename, limit, ..
            } => vec![
                filename.clone(),
                "Max file size must be".to_string(),
                format!("{:.2} {}", *limit as f64 / FILE_SIZE_UNIT, FS_UNIT_NAME),
            ],
            ValidationError::TypeNotAllowed {
                filename,
                allowed,
                detected,
            } => vec![
                filename.clone(),
                "Must be one of".to_string(),
                format!("[{}]", allowed.join(" ")),
                "Instead detected".to_string(),
                detected.clone(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// Carries the effective (sniffed) media type
    Accepted(String),
    Rejected(ValidationError),
}

impl ValidationVerdict {
    pub fn into_result(self) -> Result<String, ValidationError> {
        match self {
            ValidationVerdict::Accepted(mime_type) => Ok(mime_type),
            ValidationVerdict::Rejected(e) => Err(e),
        }
    }
}

/// Strips parameters and case, e.g. "Text/Plain; charset=utf-8" -> "text/plain"
pub fn normalize_mime_type(content_type: &str) -> String {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    }
}

/// Applies the upload policy to one file.
///
/// Rules run in order and the first failure wins: size, then sniffed type.
/// The declared filename and client content type play no part in the decision.
pub fn validate_file(
    declared_size: u64,
    filename: &str,
    sniffed_mime_type: &str,
    config: &UploadConfig,
) -> ValidationVerdict {
    if declared_size > config.max_file_size {
        return ValidationVerdict::Rejected(ValidationError::SizeExceeded {
            filename: filename.to_string(),
            limit: config.max_file_size,
            actual: declared_size,
        });
    }

    let detected = normalize_mime_type(sniffed_mime_type);
    if !config
        .allowed_mime_types
        .iter()
        .any(|allowed| normalize_mime_type(allowed) == detected)
    {
        return ValidationVerdict::Rejected(ValidationError::TypeNotAllowed {
            filename: filename.to_string(),
            allowed: config.allowed_mime_types.clone(),
            detected,
        });
    }

    ValidationVerdict::Accepted(detected)
}
