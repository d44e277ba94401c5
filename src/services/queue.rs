use tokio::sync::mpsc;

use crate::models::job::TranscodeJob;

/// Capacity of the in-flight slot. Exactly one: the system-wide concurrency
/// cap for encoder subprocess work.
const QUEUE_CAPACITY: usize = 1;

/// Producer half of the admission queue.
///
/// `enqueue` blocks the caller until the single worker slot is free. That
/// blocking is the system's only flow control: a producer submitting while a
/// job is in flight is stalled, not rejected.
#[derive(Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<TranscodeJob>,
}

/// Worker half of the admission queue. Held by the single worker loop.
pub struct JobReceiver {
    rx: mpsc::Receiver<TranscodeJob>,
}

/// Create the single-slot admission queue.
pub fn admission_queue() -> (AdmissionQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (AdmissionQueue { tx }, JobReceiver { rx })
}

impl AdmissionQueue {
    /// Hand a job to the worker, waiting for the slot to free up.
    pub async fn enqueue(&self, job: TranscodeJob) -> Result<(), QueueError> {
        self.tx.send(job).await.map_err(|_| QueueError::Closed)
    }
}

impl JobReceiver {
    /// Receive the next job, or `None` once every producer handle is gone.
    pub async fn recv(&mut self) -> Option<TranscodeJob> {
        self.rx.recv().await
    }

    /// Stop accepting new jobs. Producers blocked in `enqueue` observe
    /// `QueueError::Closed`; jobs already in the slot are still delivered.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("admission queue is closed")]
    Closed,
}
