use crate::config::{RemoteStoreConfig, UploadConfig};
use crate::services::storage::{LocalStagingStorage, S3ObjectStore, StorageBackend};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds both storage backends from already loaded configuration.
///
/// The S3 session itself is created lazily on the first remote upload.
pub fn setup_storage(
    upload_config: &UploadConfig,
    remote_config: &RemoteStoreConfig,
) -> (Arc<dyn StorageBackend>, Arc<dyn StorageBackend>) {
    info!(
        "📁 Local staging: {}",
        upload_config.staging_dir.display()
    );

    if remote_config.region.is_empty() || remote_config.bucket.is_empty() {
        warn!("⚠️  AWS_REGION or AWS_BUCKET not set, remote uploads will fail");
    } else {
        info!(
            "☁️  S3 Storage: {} (Bucket: {}, Dir: '{}', ACL: '{}')",
            remote_config
                .endpoint_url
                .as_deref()
                .unwrap_or(&remote_config.region),
            remote_config.bucket,
            remote_config.upload_dir,
            remote_config.acl
        );
    }

    // The following are read by the default credentials chain, only checked here
    let key_is_set = std::env::var_os("AWS_ACCESS_KEY_ID").is_some();
    let secret_is_set = std::env::var_os("AWS_SECRET_ACCESS_KEY").is_some();
    info!("🔑 Static AWS credentials present: {}", key_is_set && secret_is_set);

    let local: Arc<dyn StorageBackend> =
        Arc::new(LocalStagingStorage::new(upload_config.staging_dir.clone()));
    let remote: Arc<dyn StorageBackend> = Arc::new(S3ObjectStore::new(remote_config.clone()));
    (local, remote)
}
