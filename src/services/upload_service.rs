use crate::api::error::AppError;
use crate::config::UploadConfig;
use crate::models::{FileReader, IncomingFile, UploadRequest, UploadResponse, UploadResult};
use crate::services::storage::StorageBackend;
use crate::utils::sniffer;
use crate::utils::validation::validate_file;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Result of handing one accepted file to a backend
#[derive(Debug)]
pub enum DispatchOutcome {
    Stored(UploadResult),
    Failed(AppError),
}

/// A file that passed validation, with its stream rewound past the sniffed prefix
struct AcceptedFile {
    index: usize,
    file: IncomingFile,
    mime_type: String,
    reader: FileReader,
}

/// Validates every file of a request in order, then stores them concurrently.
///
/// Any rejection aborts the request before storage starts. Once dispatched,
/// every storage operation runs to completion; if some fail, the failure of
/// the lowest input index becomes the response.
pub struct UploadService {
    config: UploadConfig,
    local: Arc<dyn StorageBackend>,
    remote: Arc<dyn StorageBackend>,
}

impl UploadService {
    pub fn new(
        config: UploadConfig,
        local: Arc<dyn StorageBackend>,
        remote: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            config,
            local,
            remote,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn backend(&self, use_remote_storage: bool) -> Arc<dyn StorageBackend> {
        if use_remote_storage {
            self.remote.clone()
        } else {
            self.local.clone()
        }
    }

    pub async fn process(&self, request: UploadRequest) -> Result<UploadResponse, AppError> {
        let begin = Instant::now();
        let UploadRequest {
            files,
            use_remote_storage,
        } = request;
        info!(
            "Received {} files (use_s3={})",
            files.len(),
            use_remote_storage
        );

        if files.is_empty() {
            return Err(AppError::MalformedRequest("No files provided".to_string()));
        }

        let accepted = self.validate_all(files).await?;
        let backend = self.backend(use_remote_storage);
        let results = Self::dispatch_all(accepted, backend).await?;

        info!("Results: {:?}", results);
        info!("All uploads finished in: {:?}", begin.elapsed());
        Ok(UploadResponse::success(results, use_remote_storage))
    }

    /// Opens, sniffs and validates each file in input order.
    ///
    /// Runs without spawning so only one reader touches a stream while its
    /// prefix is inspected. The first rejection wins.
    async fn validate_all(&self, files: Vec<IncomingFile>) -> Result<Vec<AcceptedFile>, AppError> {
        let mut accepted = Vec::with_capacity(files.len());

        for (index, file) in files.into_iter().enumerate() {
            let reader = file
                .open()
                .await
                .map_err(|source| AppError::FileUnavailable {
                    filename: file.filename.clone(),
                    source,
                })?;

            let sniffed =
                sniffer::sniff(reader)
                    .await
                    .map_err(|source| AppError::FileUnavailable {
                        filename: file.filename.clone(),
                        source,
                    })?;

            let mime_type = validate_file(
                file.declared_size,
                &file.filename,
                sniffed.mime_type,
                &self.config,
            )
            .into_result()
            .map_err(|e| {
                warn!(
                    "_{}_ Rejected {} ({}): {} [declared: {:?}, detected: {}]",
                    index + 1,
                    file.filename,
                    e.code(),
                    e,
                    file.content_type,
                    sniffed.mime_type
                );
                AppError::from(e)
            })?;

            accepted.push(AcceptedFile {
                index,
                file,
                mime_type,
                reader: Box::new(sniffed.reader),
            });
        }

        Ok(accepted)
    }

    /// Spawns one storage task per file and waits for all of them.
    async fn dispatch_all(
        accepted: Vec<AcceptedFile>,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Vec<UploadResult>, AppError> {
        let expected = accepted.len();
        let names: Vec<String> = accepted.iter().map(|a| a.file.filename.clone()).collect();

        // Capacity covers every dispatch so no task waits on the receiver
        let (tx, mut rx) = mpsc::channel::<(usize, DispatchOutcome)>(expected.max(1));
        // Dropped handles detach: transfers outlive an abandoned request
        let mut handles = Vec::with_capacity(expected);

        for AcceptedFile {
            index,
            file,
            mime_type,
            reader,
        } in accepted
        {
            let tx = tx.clone();
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let outcome = match backend.store(reader, &file.filename, &mime_type).await {
                    Ok(destination) => {
                        info!(
                            "_{}_ {} upload finished: {} -> {}",
                            index + 1,
                            backend.name(),
                            file.filename,
                            destination
                        );
                        DispatchOutcome::Stored(UploadResult {
                            original_name: file.filename.clone(),
                            destination,
                            mime_type,
                        })
                    }
                    Err(source) => {
                        error!(
                            "_{}_ Failed to store {} via {}: {}",
                            index + 1,
                            file.filename,
                            backend.name(),
                            source
                        );
                        DispatchOutcome::Failed(AppError::Storage {
                            filename: file.filename.clone(),
                            source,
                        })
                    }
                };
                let _ = tx.send((index, outcome)).await;
            }));
        }
        drop(tx);

        // Completion barrier: nothing is cancelled, every dispatch finishes
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Dispatch task did not complete: {}", e);
            }
        }

        let mut slots: Vec<Option<DispatchOutcome>> = (0..expected).map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }

        let failed = slots
            .iter()
            .filter(|s| !matches!(s, Some(DispatchOutcome::Stored(_))))
            .count();
        if failed > 0 {
            warn!("{} of {} dispatches failed", failed, expected);
        }

        let mut results = Vec::with_capacity(expected);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(DispatchOutcome::Stored(result)) => results.push(result),
                Some(DispatchOutcome::Failed(e)) => return Err(e),
                None => {
                    return Err(AppError::Internal(format!(
                        "No outcome reported for {}",
                        names[index]
                    )));
                }
            }
        }

        Ok(results)
    }
}
