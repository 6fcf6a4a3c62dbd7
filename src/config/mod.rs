use std::env;
use std::path::PathBuf;

/// 2.5 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 << 18;

/// Headroom on top of the combined file sizes for multipart boundaries and headers.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

/// Upload policy shared by the validator and the orchestrator
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single file in bytes (default: 2.5 MiB)
    pub max_file_size: u64,

    /// Maximum size of the whole multipart body in bytes.
    /// Must admit every file of one request combined (default: 5 files + overhead)
    pub max_form_size: usize,

    /// Media types accepted after sniffing (default: jpeg, png, gif)
    pub allowed_mime_types: Vec<String>,

    /// Directory for locally staged files (default: system temp dir)
    pub staging_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_form_size: DEFAULT_MAX_FILE_SIZE as usize * 5 + MULTIPART_OVERHEAD,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            staging_dir: env::temp_dir(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        let max_file_size = lookup("MAX_FILE_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.max_file_size);

        // Keep the form limit in step with a custom file limit unless set explicitly
        let max_form_size = lookup("MAX_FORM_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(max_file_size as usize * 5 + MULTIPART_OVERHEAD);

        let allowed_mime_types = lookup("ALLOWED_MIME_TYPES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty())
            .unwrap_or(default.allowed_mime_types);

        Self {
            max_file_size,
            max_form_size,
            allowed_mime_types,
            staging_dir: lookup("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),
        }
    }
}

/// Settings for the remote object store.
///
/// Values are taken as-is; an empty region or bucket only fails when the
/// first remote dispatch tries to open a session.
#[derive(Debug, Clone, Default)]
pub struct RemoteStoreConfig {
    pub region: String,
    pub bucket: String,
    /// Canned ACL applied to every object, e.g. "public-read". Empty means none.
    pub acl: String,
    /// Key prefix inside the bucket, e.g. "uploads/"
    pub upload_dir: String,
    /// Custom S3-compatible endpoint (MinIO etc.)
    pub endpoint_url: Option<String>,
}

impl RemoteStoreConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            region: lookup("AWS_REGION").unwrap_or_default(),
            bucket: lookup("AWS_BUCKET").unwrap_or_default(),
            acl: lookup("UPLOAD_ACL").unwrap_or_default(),
            upload_dir: lookup("UPLOAD_DIR").unwrap_or_default(),
            endpoint_url: lookup("AWS_ENDPOINT_URL").filter(|v| !v.is_empty()),
        }
    }
}
