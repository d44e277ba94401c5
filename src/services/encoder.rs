use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

/// Conversion target, bit-exact for interoperability with downstream players.
const TARGET_CODEC: &str = "libmp3lame";
const TARGET_SAMPLE_RATE: &str = "48000";
const TARGET_BITRATE: &str = "320k";
/// Streaming segment duration in seconds.
const SEGMENT_SECONDS: &str = "5";

/// Playlist file name inside a rendition directory.
pub const PLAYLIST_FILE: &str = "playlist.m3u8";
/// Subdirectory of a rendition directory holding the media segments.
pub const SEGMENTS_DIR: &str = "segments";

/// Container metadata extracted from the probe subprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub duration_secs: f64,
    pub stream_count: i32,
    pub container_format: String,
}

/// Synchronous adapter over the external encoding engine. All operations
/// shell out and wait; callers are expected to run on the dedicated worker.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Inspect the container of `input` without decoding it.
    async fn probe(&self, input: &Path) -> Result<ProbeReport, EncoderError>;

    /// Transcode `input` to the canonical codec at `output`. The output file
    /// is verified to exist and be non-empty; a zero exit status alone is not
    /// taken as evidence of a usable file.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), EncoderError>;

    /// Split the normalized audio into fixed-duration segments plus a
    /// playlist listing all of them, under `output_dir`.
    async fn segment(&self, input: &Path, output_dir: &Path) -> Result<(), EncoderError>;
}

/// `Encoder` implementation driving `ffmpeg`/`ffprobe` subprocesses with a
/// per-invocation deadline. Timed-out children are killed, not orphaned.
pub struct FfmpegEncoder {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
    stage_timeout: Duration,
    segment_base_url: String,
}

impl FfmpegEncoder {
    pub fn new(
        ffmpeg_bin: PathBuf,
        ffprobe_bin: PathBuf,
        stage_timeout: Duration,
        segment_base_url: String,
    ) -> Self {
        Self {
            ffmpeg_bin,
            ffprobe_bin,
            stage_timeout,
            segment_base_url,
        }
    }

    async fn run_tool(
        &self,
        tool: &'static str,
        bin: &Path,
        args: Vec<OsString>,
    ) -> Result<std::process::Output, EncoderError> {
        let mut cmd = Command::new(bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.stage_timeout, cmd.output()).await {
            Err(_) => {
                return Err(EncoderError::TimedOut {
                    tool,
                    seconds: self.stage_timeout.as_secs(),
                })
            }
            Ok(Err(source)) => return Err(EncoderError::Spawn { tool, source }),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            // The diagnostic stream goes into the error for operational logs;
            // it is never copied into a job's persisted status.
            return Err(EncoderError::Failed {
                tool,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

fn probe_args(input: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-i".into(),
        input.into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
    ]
}

fn convert_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-acodec".into(),
        TARGET_CODEC.into(),
        "-ar".into(),
        TARGET_SAMPLE_RATE.into(),
        "-b:a".into(),
        TARGET_BITRATE.into(),
        "-y".into(),
        output.into(),
    ]
}

fn segment_args(input: &Path, output_dir: &Path, base_url: &str) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-ar".into(),
        TARGET_SAMPLE_RATE.into(),
        "-b:a".into(),
        TARGET_BITRATE.into(),
        "-hls_time".into(),
        SEGMENT_SECONDS.into(),
        // MPEG-TS segments are compatible with every HLS version.
        "-hls_segment_type".into(),
        "mpegts".into(),
        // 0 keeps every segment in the playlist, no windowing.
        "-hls_list_size".into(),
        "0".into(),
        "-hls_base_url".into(),
        base_url.into(),
        "-hls_segment_filename".into(),
        output_dir.join(SEGMENTS_DIR).join("segment%03d.ts").into(),
        "-vn".into(),
        output_dir.join(PLAYLIST_FILE).into(),
    ]
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn probe(&self, input: &Path) -> Result<ProbeReport, EncoderError> {
        let output = self
            .run_tool("ffprobe", &self.ffprobe_bin, probe_args(input))
            .await?;
        parse_probe_report(&output.stdout)
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), EncoderError> {
        self.run_tool("ffmpeg", &self.ffmpeg_bin, convert_args(input, output))
            .await?;

        let metadata = tokio::fs::metadata(output)
            .await
            .map_err(|_| EncoderError::MissingOutput(output.to_path_buf()))?;
        if metadata.len() == 0 {
            return Err(EncoderError::MissingOutput(output.to_path_buf()));
        }

        Ok(())
    }

    async fn segment(&self, input: &Path, output_dir: &Path) -> Result<(), EncoderError> {
        tokio::fs::create_dir_all(output_dir.join(SEGMENTS_DIR)).await?;

        self.run_tool(
            "ffmpeg",
            &self.ffmpeg_bin,
            segment_args(input, output_dir, &self.segment_base_url),
        )
        .await?;

        verify_rendition(output_dir).await
    }
}

/// A usable rendition has a non-empty playlist and at least one non-empty
/// segment. A zero exit status with a playlist but no media is still a
/// failed segmentation.
async fn verify_rendition(output_dir: &Path) -> Result<(), EncoderError> {
    let playlist = output_dir.join(PLAYLIST_FILE);
    let metadata = tokio::fs::metadata(&playlist)
        .await
        .map_err(|_| EncoderError::MissingOutput(playlist.clone()))?;
    if metadata.len() == 0 {
        return Err(EncoderError::MissingOutput(playlist));
    }

    let segments_dir = output_dir.join(SEGMENTS_DIR);
    let mut entries = tokio::fs::read_dir(&segments_dir)
        .await
        .map_err(|_| EncoderError::MissingOutput(segments_dir.clone()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.metadata().await?.len() > 0 {
            return Ok(());
        }
    }
    Err(EncoderError::MissingOutput(segments_dir))
}

/// Shape of `ffprobe -print_format json -show_format` output. There is other
/// information on stdout for some containers; only `format` matters here.
#[derive(Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    nb_streams: i32,
    format_name: String,
    // ffprobe emits the duration as a decimal string.
    duration: String,
}

fn parse_probe_report(stdout: &[u8]) -> Result<ProbeReport, EncoderError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    let duration_secs = parsed
        .format
        .duration
        .parse::<f64>()
        .map_err(|_| EncoderError::InvalidDuration(parsed.format.duration.clone()))?;

    Ok(ProbeReport {
        duration_secs,
        stream_count: parsed.format.nb_streams,
        container_format: parsed.format.format_name,
    })
}

/// Per-job memoization of the probe result. The first call shells out;
/// later calls within the same job reuse the parsed report.
pub struct ProbeCache {
    report: Option<ProbeReport>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self { report: None }
    }

    pub async fn get_or_probe<E: Encoder + ?Sized>(
        &mut self,
        encoder: &E,
        input: &Path,
    ) -> Result<ProbeReport, EncoderError> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }
        let report = encoder.probe(input).await?;
        self.report = Some(report.clone());
        Ok(report)
    }
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} did not finish within {seconds}s")]
    TimedOut { tool: &'static str, seconds: u64 },

    #[error("unreadable probe report: {0}")]
    UnreadableReport(#[from] serde_json::Error),

    #[error("probe reported a non-numeric duration: {0}")]
    InvalidDuration(String),

    #[error("encoder reported success but {0} is missing or empty")]
    MissingOutput(PathBuf),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
