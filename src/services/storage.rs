use crate::config::RemoteStoreConfig;
use crate::models::FileReader;
use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create storage session: {0}")]
    SessionSetup(String),

    #[error("Failed to upload {key} to {bucket}: {reason}")]
    Transfer {
        key: String,
        bucket: String,
        reason: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| StorageError::Io { context, source }
    }
}

/// Persists one file and returns its destination identifier
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Drains `reader` completely into a new destination.
    ///
    /// `destination_hint` is the original filename; backends may use it
    /// to derive an extension but never as the destination itself.
    async fn store(
        &self,
        reader: FileReader,
        destination_hint: &str,
        mime_type: &str,
    ) -> Result<String, StorageError>;

    /// Short label used in logs and health output
    fn name(&self) -> &'static str;
}

/// Writes each file to a fresh, uniquely named file in the staging directory
pub struct LocalStagingStorage {
    staging_dir: PathBuf,
}

impl LocalStagingStorage {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStagingStorage {
    async fn store(
        &self,
        mut reader: FileReader,
        destination_hint: &str,
        _mime_type: &str,
    ) -> Result<String, StorageError> {
        let temp_file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.staging_dir)
            .map_err(StorageError::io("Unable to create temporary file"))?;

        // Both handles close when this scope ends; the temp file is only
        // removed if we bail out before `keep`.
        let mut temp_file_async = tokio::fs::File::from_std(
            temp_file
                .reopen()
                .map_err(StorageError::io("Unable to create temporary file"))?,
        );

        let copied = tokio::io::copy(&mut reader, &mut temp_file_async)
            .await
            .map_err(StorageError::io("Unable to copy file content"))?;
        temp_file_async
            .flush()
            .await
            .map_err(StorageError::io("Unable to copy file content"))?;
        drop(temp_file_async);

        let (_file, path) = temp_file
            .keep()
            .map_err(|e| StorageError::Io {
                context: "Unable to keep temporary file",
                source: e.error,
            })?;

        tracing::debug!(
            "Staged {} ({} bytes) at {}",
            destination_hint,
            copied,
            path.display()
        );
        Ok(path.to_string_lossy().into_owned())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Extension of the last path element including the dot, `""` when absent.
///
/// Dotfiles keep their whole name: `.bashrc` -> `.bashrc`.
fn file_extension(filename: &str) -> &str {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}

/// Generate a new object key: upload dir + UUID4 + the original extension
pub fn gen_object_key(upload_dir: &str, original_filename: &str) -> String {
    format!(
        "{}{}{}",
        upload_dir,
        Uuid::new_v4(),
        file_extension(original_filename)
    )
}

/// Public URL of an object.
///
/// `https://BUCKET.s3.REGION.amazonaws.com/KEY`, or `ENDPOINT/BUCKET/KEY`
/// for a custom endpoint. Key segments are percent-encoded.
pub fn gen_object_url(config: &RemoteStoreConfig, key: &str) -> String {
    let base = match &config.endpoint_url {
        Some(endpoint) => url::Url::parse(endpoint),
        None => url::Url::parse(&format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        )),
    };

    // Unparseable endpoint/bucket: fall back to the bare key
    let Ok(mut url) = base else {
        return key.to_string();
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty();
            if config.endpoint_url.is_some() {
                segments.push(&config.bucket);
            }
            segments.extend(key.trim_start_matches('/').split('/'));
        }
        Err(()) => return key.to_string(),
    }
    url.to_string()
}

/// Resolves credentials once so a missing or broken provider fails the
/// session instead of the transfer.
async fn check_credentials(
    config: &RemoteStoreConfig,
    provider: Option<&SharedCredentialsProvider>,
) -> Result<(), StorageError> {
    let Some(provider) = provider else {
        tracing::error!(
            "S3 session setup failed: no credentials provider (region={}, bucket={})",
            config.region,
            config.bucket
        );
        return Err(StorageError::SessionSetup("no credentials provider".into()));
    };

    if let Err(e) = provider.provide_credentials().await {
        tracing::error!(
            "S3 session setup failed: unable to load credentials (region={}, bucket={}): {}",
            config.region,
            config.bucket,
            e
        );
        return Err(StorageError::SessionSetup(format!(
            "unable to load credentials: {}",
            e
        )));
    }
    Ok(())
}

/// Remote object store speaking the S3 API.
///
/// The client session is created on first use so a missing region or bucket
/// surfaces as a storage error for the request that needs it.
pub struct S3ObjectStore {
    config: RemoteStoreConfig,
    client: OnceCell<Client>,
}

impl S3ObjectStore {
    pub fn new(config: RemoteStoreConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client, StorageError> {
        self.client
            .get_or_try_init(|| async {
                if self.config.region.is_empty() {
                    tracing::error!("S3 session setup failed: AWS_REGION is not set");
                    return Err(StorageError::SessionSetup("region is not configured".into()));
                }
                if self.config.bucket.is_empty() {
                    tracing::error!("S3 session setup failed: AWS_BUCKET is not set");
                    return Err(StorageError::SessionSetup("bucket is not configured".into()));
                }

                let mut loader = aws_config::from_env().region(Region::new(self.config.region.clone()));
                if let Some(endpoint) = &self.config.endpoint_url {
                    loader = loader.endpoint_url(endpoint);
                }
                let aws_config = loader.load().await;

                check_credentials(&self.config, aws_config.credentials_provider().as_ref())
                    .await?;

                let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                    .force_path_style(self.config.endpoint_url.is_some())
                    .build();

                tracing::info!(
                    "☁️  S3 session ready (region={}, bucket={})",
                    self.config.region,
                    self.config.bucket
                );
                Ok(Client::from_conf(s3_config))
            })
            .await
    }
}

#[async_trait]
impl StorageBackend for S3ObjectStore {
    async fn store(
        &self,
        mut reader: FileReader,
        destination_hint: &str,
        mime_type: &str,
    ) -> Result<String, StorageError> {
        let client = self.client().await?;
        let key = gen_object_key(&self.config.upload_dir, destination_hint);

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(StorageError::io("Unable to read file content"))?;

        let mut request = client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(mime_type)
            .body(ByteStream::from(data));
        if !self.config.acl.is_empty() {
            request = request.acl(ObjectCannedAcl::from(self.config.acl.as_str()));
        }

        if let Err(e) = request.send().await {
            let service_error = e.into_service_error();
            tracing::error!(
                "S3 put_object failed: key={}, bucket={}, acl={}, error={:?}",
                key,
                self.config.bucket,
                self.config.acl,
                service_error
            );
            return Err(StorageError::Transfer {
                key,
                bucket: self.config.bucket.clone(),
                reason: service_error.to_string(),
            });
        }

        Ok(gen_object_url(&self.config, &key))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
