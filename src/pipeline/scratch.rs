use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Exclusive per-job scratch space under the configured work directory:
/// `<work_dir>/<job-id>/` holding the converted file and the HLS rendition.
///
/// The directory is removed when the guard drops, so success, failure, and
/// shutdown all leave no scratch files behind.
pub struct JobScratch {
    root: PathBuf,
}

impl JobScratch {
    pub async fn create(work_dir: &Path, job_id: Uuid) -> std::io::Result<Self> {
        let root = work_dir.join(job_id.to_string());
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target of the convert step.
    pub fn converted_path(&self) -> PathBuf {
        self.root.join("converted.mp3")
    }

    /// Rendition directory handed to the segment step and the publisher.
    pub fn rendition_dir(&self) -> PathBuf {
        self.root.join("hls")
    }
}

impl Drop for JobScratch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.root.display(),
                    error = %e,
                    "failed to remove scratch directory"
                );
            }
        }
    }
}
