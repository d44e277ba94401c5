//! Admission surface: validate a ready upload, create the job, write the
//! initial status, and hand it to the worker.

use std::path::PathBuf;

use crate::models::job::TranscodeJob;
use crate::models::status::StatusRecord;
use crate::services::queue::{AdmissionQueue, QueueError};
use crate::services::status::{StatusStore, StatusStoreError};

/// File extensions accepted for transcoding.
const SUPPORTED_EXTENSIONS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "wav"];

/// Validate `source_path` and enqueue a transcode job for it.
///
/// Returns as soon as the job is queued, not when it completes; callers poll
/// the status store for progress. Blocks while another job occupies the
/// worker slot. Validation failures reject the submission before any job
/// record exists.
pub async fn submit<S: StatusStore>(
    queue: &AdmissionQueue,
    status: &S,
    source_path: PathBuf,
) -> Result<TranscodeJob, IngestError> {
    let extension = source_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(IngestError::UnsupportedFormat(extension));
    }

    let metadata = tokio::fs::metadata(&source_path)
        .await
        .map_err(|_| IngestError::SourceMissing(source_path.clone()))?;
    if metadata.len() == 0 {
        return Err(IngestError::SourceEmpty(source_path));
    }

    let job = TranscodeJob::new(source_path);
    status.set(&StatusRecord::queued(job.id)).await?;
    queue.enqueue(job.clone()).await?;

    tracing::info!(job_id = %job.id, "job admitted");
    Ok(job)
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("source file is empty: {0}")]
    SourceEmpty(PathBuf),

    #[error("unsupported audio format: {0:?}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StatusStoreError),
}
