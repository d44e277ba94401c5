use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work: transcode one uploaded audio file.
///
/// Created once by the admission surface, never mutated afterwards. The `id`
/// is the correlation key across the queue, the status store, and the scratch
/// directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub id: Uuid,
    /// Location of the original upload. Owned by the uploader; the pipeline
    /// only reads it until the job reaches a terminal state.
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            created_at: Utc::now(),
        }
    }
}
