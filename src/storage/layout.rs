use crate::config::PoseEncoding;
use crate::error::CaptureResult;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SENSOR_DIR: &str = "Sensor";
pub const GPS_DIR: &str = "GPS";
pub const GT_DIR: &str = "Gt";

const IMU_FILE: &str = "imu.txt";
const GPS_FILE: &str = "gps.txt";
const COMPASS_FILE: &str = "compass.txt";
const POSE_ARRAY_FILE: &str = "transform.json";
const POSE_NDJSON_FILE: &str = "transform.jsonl";
const PAYLOAD_FILE: &str = "payload.json";

/// One independently persisted stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    Pose,
    Imu,
    Gps,
    Compass,
}

impl StreamId {
    pub const ALL: [StreamId; 4] = [
        StreamId::Pose,
        StreamId::Imu,
        StreamId::Gps,
        StreamId::Compass,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StreamId::Pose => "pose",
            StreamId::Imu => "imu",
            StreamId::Gps => "gps",
            StreamId::Compass => "compass",
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Paths of one session folder
///
/// ```text
/// <root>/
///   Sensor/imu.txt
///   GPS/gps.txt
///   GPS/compass.txt
///   Gt/transform.json | Gt/transform.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    /// Wrap an existing session folder
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SessionLayout { root: root.into() }
    }

    pub fn folder_name(created_at: &DateTime<Utc>) -> String {
        created_at.format("%Y-%m-%d_%H-%M-%S").to_string()
    }

    /// Create `<base>/<timestamp>/` with its stream subfolders. A second
    /// session in the same second gets a numeric suffix.
    pub fn create(base_dir: impl AsRef<Path>, created_at: &DateTime<Utc>) -> CaptureResult<Self> {
        let base_dir = base_dir.as_ref();
        let name = Self::folder_name(created_at);

        let mut root = base_dir.join(&name);
        let mut suffix = 1;
        while root.exists() {
            root = base_dir.join(format!("{}-{}", name, suffix));
            suffix += 1;
        }

        for sub in [SENSOR_DIR, GPS_DIR, GT_DIR] {
            fs::create_dir_all(root.join(sub))?;
        }
        log::info!("Created session folder {}", root.display());

        Ok(SessionLayout { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn imu_path(&self) -> PathBuf {
        self.root.join(SENSOR_DIR).join(IMU_FILE)
    }

    pub fn gps_path(&self) -> PathBuf {
        self.root.join(GPS_DIR).join(GPS_FILE)
    }

    pub fn compass_path(&self) -> PathBuf {
        self.root.join(GPS_DIR).join(COMPASS_FILE)
    }

    pub fn pose_array_path(&self) -> PathBuf {
        self.root.join(GT_DIR).join(POSE_ARRAY_FILE)
    }

    pub fn pose_ndjson_path(&self) -> PathBuf {
        self.root.join(GT_DIR).join(POSE_NDJSON_FILE)
    }

    pub fn payload_path(&self) -> PathBuf {
        self.root.join(PAYLOAD_FILE)
    }

    pub fn stream_path(&self, stream: StreamId, encoding: PoseEncoding) -> PathBuf {
        match stream {
            StreamId::Imu => self.imu_path(),
            StreamId::Gps => self.gps_path(),
            StreamId::Compass => self.compass_path(),
            StreamId::Pose => match encoding {
                PoseEncoding::Ndjson => self.pose_ndjson_path(),
                PoseEncoding::JsonArray => self.pose_array_path(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_session_folders() {
        let base = tempfile::tempdir().unwrap();
        let created = Utc.with_ymd_and_hms(2024, 9, 25, 14, 3, 7).unwrap();

        let layout = SessionLayout::create(base.path(), &created).unwrap();
        assert_eq!(layout.root(), base.path().join("2024-09-25_14-03-07"));
        for sub in [SENSOR_DIR, GPS_DIR, GT_DIR] {
            assert!(layout.root().join(sub).is_dir());
        }

        let second = SessionLayout::create(base.path(), &created).unwrap();
        assert_eq!(second.root(), base.path().join("2024-09-25_14-03-07-1"));
    }

    #[test]
    fn test_stream_paths() {
        let layout = SessionLayout::new("/data/s1");
        assert_eq!(layout.imu_path(), PathBuf::from("/data/s1/Sensor/imu.txt"));
        assert_eq!(layout.gps_path(), PathBuf::from("/data/s1/GPS/gps.txt"));
        assert_eq!(layout.compass_path(), PathBuf::from("/data/s1/GPS/compass.txt"));
        assert_eq!(
            layout.stream_path(StreamId::Pose, PoseEncoding::JsonArray),
            PathBuf::from("/data/s1/Gt/transform.json")
        );
        assert_eq!(
            layout.stream_path(StreamId::Pose, PoseEncoding::Ndjson),
            PathBuf::from("/data/s1/Gt/transform.jsonl")
        );
    }
}
