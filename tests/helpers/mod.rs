//! Test doubles for driving the pipeline without ffmpeg or an IPFS daemon.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use trackforge::models::status::{Stage, StatusRecord};
use trackforge::services::encoder::{
    Encoder, EncoderError, ProbeReport, PLAYLIST_FILE, SEGMENTS_DIR,
};
use trackforge::services::publisher::{ContentPublisher, PublishError};
use trackforge::services::status::{StatusStore, StatusStoreError};

/// Shared log of collaborator calls and status writes, used to assert
/// ordering properties across a run.
pub type EventLog = Arc<Mutex<Vec<Event>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StatusWrite {
        id: Uuid,
        percentage: u8,
        stage: Stage,
    },
    Convert,
    Segment,
    AddDirectory,
    Pin,
    Unpin,
}

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Checkpoint writes for one job, in write order.
pub fn checkpoints_for(events: &EventLog, id: Uuid) -> Vec<(u8, Stage)> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::StatusWrite {
                id: event_id,
                percentage,
                stage,
            } if *event_id == id => Some((*percentage, *stage)),
            _ => None,
        })
        .collect()
}

/// Encoder double. Writes plausible output files so later stages and the
/// publisher see a real directory layout.
#[derive(Clone, Default)]
pub struct FakeEncoder {
    pub fail_probe: bool,
    pub fail_convert: bool,
    pub fail_segment: bool,
    pub probe_calls: Arc<AtomicUsize>,
    pub events: EventLog,
}

impl FakeEncoder {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    fn tool_failure(tool: &'static str) -> EncoderError {
        EncoderError::Failed {
            tool,
            code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        }
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn probe(&self, _input: &Path) -> Result<ProbeReport, EncoderError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe {
            return Err(Self::tool_failure("ffprobe"));
        }
        Ok(ProbeReport {
            duration_secs: 30.0,
            stream_count: 1,
            container_format: "wav".to_string(),
        })
    }

    async fn convert(&self, _input: &Path, output: &Path) -> Result<(), EncoderError> {
        self.events.lock().unwrap().push(Event::Convert);
        if self.fail_convert {
            return Err(Self::tool_failure("ffmpeg"));
        }
        tokio::fs::write(output, b"mp3 bytes").await?;
        Ok(())
    }

    async fn segment(&self, _input: &Path, output_dir: &Path) -> Result<(), EncoderError> {
        self.events.lock().unwrap().push(Event::Segment);
        if self.fail_segment {
            return Err(Self::tool_failure("ffmpeg"));
        }
        tokio::fs::create_dir_all(output_dir.join(SEGMENTS_DIR)).await?;
        tokio::fs::write(
            output_dir.join(PLAYLIST_FILE),
            b"#EXTM3U\n#EXTINF:5.0,\nsegments/segment000.ts\n#EXT-X-ENDLIST\n",
        )
        .await?;
        tokio::fs::write(
            output_dir.join(SEGMENTS_DIR).join("segment000.ts"),
            b"ts bytes",
        )
        .await?;
        Ok(())
    }
}

/// Publisher double. Records the relative paths it was asked to publish so
/// tests can assert on the rendition layout after the scratch dir is gone.
#[derive(Clone, Default)]
pub struct FakePublisher {
    pub fail_add: bool,
    pub fail_pin: bool,
    pub events: EventLog,
    pub published_files: Arc<Mutex<Vec<String>>>,
}

impl FakePublisher {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    fn api_failure() -> PublishError {
        PublishError::Api {
            status: 500,
            message: "remote store unavailable".to_string(),
        }
    }

    fn record_tree(&self, dir: &Path, prefix: &str) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            if entry.path().is_dir() {
                self.record_tree(&entry.path(), &relative);
            } else {
                self.published_files.lock().unwrap().push(relative);
            }
        }
    }
}

#[async_trait]
impl ContentPublisher for FakePublisher {
    async fn add(&self, _bytes: Vec<u8>) -> Result<String, PublishError> {
        Ok("QmBlob".to_string())
    }

    async fn add_directory(&self, dir: &Path) -> Result<String, PublishError> {
        self.events.lock().unwrap().push(Event::AddDirectory);
        if self.fail_add {
            return Err(Self::api_failure());
        }
        self.record_tree(dir, "");
        Ok("QmRendition".to_string())
    }

    async fn pin(&self, _address: &str) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(Event::Pin);
        if self.fail_pin {
            return Err(Self::api_failure());
        }
        Ok(())
    }

    async fn unpin(&self, _address: &str) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(Event::Unpin);
        Ok(())
    }

    async fn get(&self, _address: &str, destination: &Path) -> Result<(), PublishError> {
        tokio::fs::write(destination, b"").await?;
        Ok(())
    }
}

/// In-memory status store that mirrors every write into the event log.
#[derive(Clone, Default)]
pub struct RecordingStore {
    records: Arc<Mutex<HashMap<Uuid, StatusRecord>>>,
    pub events: EventLog,
}

impl RecordingStore {
    pub fn new(events: EventLog) -> Self {
        Self {
            records: Arc::default(),
            events,
        }
    }
}

#[async_trait]
impl StatusStore for RecordingStore {
    async fn get(&self, id: Uuid) -> Result<Option<StatusRecord>, StatusStoreError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn set(&self, record: &StatusRecord) -> Result<(), StatusStoreError> {
        self.events.lock().unwrap().push(Event::StatusWrite {
            id: record.id,
            percentage: record.percentage,
            stage: record.stage,
        });
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }
}
