use crate::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// On-disk encoding of the pose stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseEncoding {
    /// One JSON object per line in `Gt/transform.jsonl`
    Ndjson,
    /// Whole-file JSON array in `Gt/transform.json`, rewritten on every append.
    /// O(n) per pose, only viable at ~1 Hz.
    JsonArray,
}

impl FromStr for PoseEncoding {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ndjson" | "jsonl" => Ok(PoseEncoding::Ndjson),
            "json-array" | "json_array" | "array" => Ok(PoseEncoding::JsonArray),
            other => Err(CaptureError::Config(format!("unknown pose encoding '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Reconstruction service endpoint, `None` disables upload
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            endpoint: None,
            timeout_secs: 30,
            user_agent: format!("trajectory_capture/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Capture pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub pose_interval_ms: u64,
    pub sensor_interval_ms: u64,
    pub pose_encoding: PoseEncoding,
    /// When false, pausing only flips the flag and ticks keep writing
    /// (legacy capture behaviour).
    pub pause_suppresses_writes: bool,
    /// fsync every append instead of flushing to the OS only
    pub sync_each_append: bool,
    /// Writer queue depth that triggers a backlog warning
    pub queue_warn_depth: usize,
    pub upload: UploadConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            pose_interval_ms: 1000,
            sensor_interval_ms: 10,
            pose_encoding: PoseEncoding::Ndjson,
            pause_suppresses_writes: true,
            sync_each_append: false,
            queue_warn_depth: 10_000,
            upload: UploadConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Load from a JSON file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> CaptureResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: CaptureConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.pose_interval_ms == 0 {
            return Err(CaptureError::Config("pose_interval_ms must be > 0".to_string()));
        }
        if self.sensor_interval_ms == 0 {
            return Err(CaptureError::Config("sensor_interval_ms must be > 0".to_string()));
        }
        if self.upload.timeout_secs == 0 {
            return Err(CaptureError::Config("upload.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn pose_interval(&self) -> Duration {
        Duration::from_millis(self.pose_interval_ms)
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }
}
