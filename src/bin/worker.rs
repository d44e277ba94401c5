use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use trackforge::{
    config::AppConfig,
    db, ingest,
    pipeline::{PipelineConfig, TranscodePipeline},
    services::{
        encoder::FfmpegEncoder, publisher::IpfsClient, queue::admission_queue,
        status::SqliteStatusStore,
    },
    worker::Worker,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting trackforge worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Register application metrics
    metrics::describe_counter!("transcode_jobs_total", "Total transcode jobs dequeued");
    metrics::describe_counter!(
        "transcode_jobs_completed",
        "Total transcode jobs that completed and were published"
    );
    metrics::describe_counter!("transcode_jobs_failed", "Total transcode jobs that failed");
    metrics::describe_histogram!(
        "transcode_processing_seconds",
        "Time spent driving one job through the pipeline"
    );

    // Initialize the status store
    tracing::info!("Opening status database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to open status database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");
    let status = SqliteStatusStore::new(db_pool);

    // Initialize services
    tracing::info!("Initializing encoder and publisher");
    let encoder = FfmpegEncoder::new(
        config.ffmpeg_bin.clone(),
        config.ffprobe_bin.clone(),
        Duration::from_secs(config.stage_timeout_secs),
        config.segment_base_url.clone(),
    );
    let publisher = IpfsClient::new(&config.ipfs_api_url);

    let pipeline = TranscodePipeline::new(
        encoder,
        publisher,
        status.clone(),
        PipelineConfig {
            work_dir: config.work_dir.clone(),
            include_source: config.include_source,
            retain_source: config.retain_source,
        },
    );

    let (queue, receiver) = admission_queue();

    // Ctrl-C drains the in-flight job and stops the worker
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let worker = tokio::spawn(Worker::new(receiver, pipeline).run(shutdown));

    // Submit any source files passed on the command line, then close the
    // queue so the worker exits once they are drained.
    for source in std::env::args().skip(1).map(PathBuf::from) {
        match ingest::submit(&queue, &status, source).await {
            Ok(job) => tracing::info!(job_id = %job.id, "job queued"),
            Err(e) => tracing::error!(error = %e, "submission rejected"),
        }
    }
    drop(queue);

    worker.await.expect("worker task panicked");
    tracing::info!("worker stopped");
}
