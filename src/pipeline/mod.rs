//! The transcode state machine.
//!
//! One job at a time moves through converting, segmenting, and publishing,
//! with a status checkpoint persisted immediately *before* each blocking
//! external call. The gap between the last two checkpoint values lets an
//! observer distinguish "never started a stage" from "crashed during it".

mod scratch;

pub use scratch::JobScratch;

use std::path::{Path, PathBuf};

use crate::models::job::TranscodeJob;
use crate::models::status::{Stage, StatusRecord};
use crate::services::encoder::{Encoder, EncoderError, ProbeCache};
use crate::services::publisher::{ContentPublisher, PublishError};
use crate::services::status::{StatusStore, StatusStoreError};

/// Persisted right before the convert subprocess runs.
pub const CHECKPOINT_CONVERT_STARTED: u8 = 5;
/// Persisted once the converted file is verified to exist and be non-empty.
pub const CHECKPOINT_CONVERTED: u8 = 30;
/// Persisted right before the segment subprocess runs.
pub const CHECKPOINT_SEGMENT_STARTED: u8 = 40;
/// Persisted after segmentation, right before the publisher is involved.
pub const CHECKPOINT_PUBLISH_STARTED: u8 = 80;

/// Pipeline behavior knobs. The source-handling variants of the original
/// deployment are configuration here, not code forks.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for per-job scratch directories.
    pub work_dir: PathBuf,
    /// Publish the original upload inside the rendition directory.
    pub include_source: bool,
    /// Keep the original upload on disk after the job reaches a terminal state.
    pub retain_source: bool,
}

/// Drives one job at a time through the stage sequence. All collaborators are
/// injected; the pipeline holds no process-wide state.
pub struct TranscodePipeline<E, P, S> {
    encoder: E,
    publisher: P,
    status: S,
    config: PipelineConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("status store failure: {0}")]
    Status(#[from] StatusStoreError),

    #[error("scratch filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl<E, P, S> TranscodePipeline<E, P, S>
where
    E: Encoder,
    P: ContentPublisher,
    S: StatusStore,
{
    pub fn new(encoder: E, publisher: P, status: S, config: PipelineConfig) -> Self {
        Self {
            encoder,
            publisher,
            status,
            config,
        }
    }

    /// Run a job to a terminal state. Never panics and never propagates an
    /// error: failures are recorded into the job's own status record, and the
    /// worker loop stays alive for subsequent jobs.
    pub async fn run(&self, job: &TranscodeJob) {
        let mut record = match self.status.get(job.id).await {
            Ok(Some(record)) => record,
            // The producer writes the queued record before enqueueing; if it
            // is missing or unreadable, start fresh rather than give up.
            Ok(None) => StatusRecord::queued(job.id),
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "could not load job status");
                StatusRecord::queued(job.id)
            }
        };

        // A record can already be terminal if the same id is replayed after a
        // restart. There is nothing left to do and the address, if any, must
        // not be disturbed.
        if record.stage.is_terminal() {
            tracing::warn!(job_id = %job.id, stage = %record.stage, "job already terminal, skipping");
            return;
        }

        let scratch = match JobScratch::create(&self.config.work_dir, job.id).await {
            Ok(scratch) => scratch,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "could not create scratch directory");
                metrics::counter!("transcode_jobs_failed").increment(1);
                self.record_failure(&mut record).await;
                self.discard_source(job).await;
                return;
            }
        };

        match self.execute(job, &mut record, &scratch).await {
            Ok(address) => {
                metrics::counter!("transcode_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    content_address = %address,
                    "transcode completed"
                );
            }
            Err(error) => {
                metrics::counter!("transcode_jobs_failed").increment(1);
                tracing::error!(job_id = %job.id, error = %error, "transcode failed");
                self.record_failure(&mut record).await;
            }
        }

        self.discard_source(job).await;
        // scratch drops here and removes the work files on every path
    }

    async fn execute(
        &self,
        job: &TranscodeJob,
        record: &mut StatusRecord,
        scratch: &JobScratch,
    ) -> Result<String, PipelineError> {
        // Probe before committing to the converting stage: a corrupt upload
        // fails here with the percentage still at its queued value.
        let mut probe = ProbeCache::new();
        let report = probe.get_or_probe(&self.encoder, &job.source_path).await?;
        tracing::info!(
            job_id = %job.id,
            duration_secs = report.duration_secs,
            container = %report.container_format,
            streams = report.stream_count,
            "source probed"
        );

        self.checkpoint(record, CHECKPOINT_CONVERT_STARTED, Stage::Converting)
            .await?;
        let converted = scratch.converted_path();
        self.encoder.convert(&job.source_path, &converted).await?;
        self.checkpoint(record, CHECKPOINT_CONVERTED, Stage::Converting)
            .await?;

        self.checkpoint(record, CHECKPOINT_SEGMENT_STARTED, Stage::Segmenting)
            .await?;
        let rendition = scratch.rendition_dir();
        self.encoder.segment(&converted, &rendition).await?;

        if self.config.include_source {
            let target = rendition.join(original_file_name(&job.source_path));
            tokio::fs::copy(&job.source_path, &target).await?;
        }

        self.checkpoint(record, CHECKPOINT_PUBLISH_STARTED, Stage::Publishing)
            .await?;
        let address = self.publisher.add_directory(&rendition).await?;

        if let Err(pin_error) = self.publisher.pin(&address).await {
            // The directory made it into the store but its retention was never
            // confirmed. Release it before failing the job so no unconfirmed
            // content lingers.
            if let Err(unpin_error) = self.publisher.unpin(&address).await {
                tracing::error!(
                    job_id = %job.id,
                    content_address = %address,
                    error = %unpin_error,
                    "rollback unpin failed"
                );
            }
            return Err(PipelineError::Publish(pin_error));
        }

        record.complete(address.clone());
        self.status.set(record).await?;
        Ok(address)
    }

    async fn checkpoint(
        &self,
        record: &mut StatusRecord,
        percentage: u8,
        stage: Stage,
    ) -> Result<(), PipelineError> {
        record.checkpoint(percentage, stage);
        self.status.set(record).await?;
        Ok(())
    }

    /// Mark the job failed, keeping the last persisted percentage. A store
    /// failure here is logged, not propagated: one job's bookkeeping must not
    /// take down the worker loop.
    async fn record_failure(&self, record: &mut StatusRecord) {
        record.fail();
        if let Err(e) = self.status.set(record).await {
            tracing::error!(job_id = %record.id, error = %e, "failed to record job failure");
        }
    }

    async fn discard_source(&self, job: &TranscodeJob) {
        if self.config.retain_source {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&job.source_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    job_id = %job.id,
                    path = %job.source_path.display(),
                    error = %e,
                    "failed to remove source file"
                );
            }
        }
    }
}

fn original_file_name(source: &Path) -> String {
    match source.extension() {
        Some(ext) => format!("original.{}", ext.to_string_lossy()),
        None => "original".to_string(),
    }
}
