use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::models::job::TranscodeJob;
use crate::pipeline::TranscodePipeline;
use crate::services::encoder::Encoder;
use crate::services::publisher::ContentPublisher;
use crate::services::queue::JobReceiver;
use crate::services::status::StatusStore;

/// The single worker loop. Dequeues one job at a time from the admission
/// queue and drives it through the pipeline; a failed job never stops the
/// loop. Exits on cancellation or when the queue closes.
pub struct Worker<E, P, S> {
    jobs: JobReceiver,
    pipeline: TranscodePipeline<E, P, S>,
}

impl<E, P, S> Worker<E, P, S>
where
    E: Encoder,
    P: ContentPublisher,
    S: StatusStore,
{
    pub fn new(jobs: JobReceiver, pipeline: TranscodePipeline<E, P, S>) -> Self {
        Self { jobs, pipeline }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("worker ready, waiting for jobs");

        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => {
                    // Release producers blocked in enqueue with a closed error,
                    // but still deliver anything already admitted: a producer
                    // that saw its enqueue succeed was promised the job runs.
                    self.jobs.close();
                    tracing::info!("shutdown requested, draining admitted jobs");
                    while let Some(job) = self.jobs.recv().await {
                        self.process(&job).await;
                    }
                    break;
                }
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => {
                        tracing::info!("admission queue closed, stopping worker");
                        break;
                    }
                },
            };

            self.process(&job).await;
        }
    }

    async fn process(&self, job: &TranscodeJob) {
        metrics::counter!("transcode_jobs_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            source = %job.source_path.display(),
            "processing transcode job"
        );

        let started = Instant::now();
        self.pipeline.run(job).await;
        metrics::histogram!("transcode_processing_seconds")
            .record(started.elapsed().as_secs_f64());
    }
}
