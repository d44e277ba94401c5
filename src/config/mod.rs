use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// SQLite connection string for the status store (e.g., "sqlite://trackforge.db")
    pub database_url: String,

    /// Base URL of the IPFS (Kubo) HTTP API (e.g., "http://127.0.0.1:5001")
    pub ipfs_api_url: String,

    /// Root directory for per-job scratch space
    pub work_dir: PathBuf,

    /// ffmpeg binary to invoke for convert/segment steps
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: PathBuf,

    /// ffprobe binary to invoke for container inspection
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: PathBuf,

    /// Deadline for a single encoder subprocess invocation, in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Base URL prefixed to segment entries in the generated playlist
    #[serde(default = "default_segment_base_url")]
    pub segment_base_url: String,

    /// Publish the original upload alongside the HLS rendition
    #[serde(default)]
    pub include_source: bool,

    /// Keep the original upload on disk after the job reaches a terminal state
    #[serde(default)]
    pub retain_source: bool,
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_bin() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_stage_timeout_secs() -> u64 {
    600
}

fn default_segment_base_url() -> String {
    "segments/".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
