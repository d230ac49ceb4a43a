//! Rebuilds the upload payload from a session's four logs.
//!
//! Lossy by design: unreadable files become empty streams and malformed
//! lines are dropped, so one bad sample never sinks the upload.

use crate::error::CaptureResult;
use crate::formatter::{parse_compass_line, parse_gps_line, parse_sensor_line};
use crate::storage::SessionLayout;
use crate::types::{PoseRecord, UploadPayload};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub kept: usize,
    pub dropped: usize,
}

impl StreamReport {
    fn merge(&mut self, other: StreamReport) {
        self.kept += other.kept;
        self.dropped += other.dropped;
    }
}

/// Kept/dropped entry counts per stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyReport {
    pub transform: StreamReport,
    pub imu: StreamReport,
    pub gps: StreamReport,
    pub compass: StreamReport,
}

impl AssemblyReport {
    pub fn dropped(&self) -> usize {
        self.transform.dropped + self.imu.dropped + self.gps.dropped + self.compass.dropped
    }
}

pub struct PayloadAssembler {
    layout: SessionLayout,
}

impl PayloadAssembler {
    pub fn new(layout: SessionLayout) -> Self {
        PayloadAssembler { layout }
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn assemble(&self) -> (UploadPayload, AssemblyReport) {
        let mut report = AssemblyReport::default();

        // Legacy array first; a session only ever has one of the two
        let (mut transform, array_report) = read_pose_array(&self.layout.pose_array_path());
        let (ndjson, ndjson_report) = read_pose_ndjson(&self.layout.pose_ndjson_path());
        transform.extend(ndjson);
        report.transform.merge(array_report);
        report.transform.merge(ndjson_report);

        let (imu, imu_report) = read_lines(&self.layout.imu_path(), parse_sensor_line);
        let (gps, gps_report) = read_lines(&self.layout.gps_path(), parse_gps_line);
        let (compass, compass_report) = read_lines(&self.layout.compass_path(), parse_compass_line);
        report.imu = imu_report;
        report.gps = gps_report;
        report.compass = compass_report;

        log::info!(
            "Assembled payload: {} poses, {} imu, {} gps, {} compass \
             ({} malformed entries dropped)",
            transform.len(),
            imu.len(),
            gps.len(),
            compass.len(),
            report.dropped()
        );

        let payload = UploadPayload {
            transform,
            imu,
            gps,
            compass,
        };
        (payload, report)
    }

    /// Keep a copy of what was uploaded next to the logs
    pub fn write_payload(&self, payload: &UploadPayload) -> CaptureResult<PathBuf> {
        let path = self.layout.payload_path();
        fs::write(&path, serde_json::to_vec_pretty(payload)?)?;
        Ok(path)
    }
}

fn read_text(path: &Path) -> Option<String> {
    match fs::read(path) {
        // a write may be cut mid-character; keep what decodes
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{} not present", path.display());
            None
        }
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

fn read_lines<T>(path: &Path, parse: fn(&str) -> Option<T>) -> (Vec<T>, StreamReport) {
    let mut report = StreamReport::default();
    let text = match read_text(path) {
        Some(text) => text,
        None => return (Vec::new(), report),
    };

    let mut records = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match parse(line) {
            Some(record) => {
                records.push(record);
                report.kept += 1;
            }
            None => report.dropped += 1,
        }
    }
    if report.dropped > 0 {
        log::debug!("{}: dropped {} malformed lines", path.display(), report.dropped);
    }
    (records, report)
}

fn read_pose_array(path: &Path) -> (Vec<PoseRecord>, StreamReport) {
    let mut report = StreamReport::default();
    let text = match read_text(path) {
        Some(text) => text,
        None => return (Vec::new(), report),
    };

    let items = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            log::warn!("{} is not a JSON array, ignoring it", path.display());
            return (Vec::new(), report);
        }
        Err(e) => {
            log::warn!("Failed to parse {}: {}", path.display(), e);
            return (Vec::new(), report);
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<PoseRecord>(item) {
            Ok(record) => {
                records.push(record);
                report.kept += 1;
            }
            Err(_) => report.dropped += 1,
        }
    }
    (records, report)
}

fn parse_pose_line(line: &str) -> Option<PoseRecord> {
    serde_json::from_str(line).ok()
}

fn read_pose_ndjson(path: &Path) -> (Vec<PoseRecord>, StreamReport) {
    read_lines(path, parse_pose_line)
}
