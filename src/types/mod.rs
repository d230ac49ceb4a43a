pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One camera pose with intrinsics, captured at the pose rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    #[serde(rename = "transformMatrix")]
    pub transform_matrix: RowMajor4,
    /// Seconds on the AR session clock
    pub timestamp_relative: f64,
    /// Wall clock, ms since epoch
    pub timestamp: f64,
    #[serde(rename = "flX")]
    pub fl_x: f32,
    #[serde(rename = "flY")]
    pub fl_y: f32,
    pub camera_angle_x: f32,
    pub camera_angle_y: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: u32,
    pub h: u32,
}

impl PoseRecord {
    /// Camera position projected onto the x/z ground plane
    pub fn route_point(&self) -> RoutePoint {
        let t = translation(&self.transform_matrix);
        RoutePoint::new(t.x as f64, t.z as f64)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axis3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Device-motion + magnetometer reading, captured at the sensor rate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSample {
    /// Wall clock, ms since epoch
    pub timestamp: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// rad/s
    pub rotation_rate: Axis3,
    /// g
    pub gravity: Axis3,
    /// g
    pub user_acceleration: Axis3,
    /// µT
    pub magnetic_field: Axis3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub vertical_accuracy: f64,
    pub horizontal_accuracy: f64,
}

/// Raw heading vector from the compass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompassFix {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Upload body, rebuilt from the session logs on every upload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub transform: Vec<PoseRecord>,
    pub imu: Vec<SensorSample>,
    pub gps: Vec<GpsFix>,
    pub compass: Vec<CompassFix>,
}

impl UploadPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn record_count(&self) -> usize {
        self.transform.len() + self.imu.len() + self.gps.len() + self.compass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Local route from the recorded poses, in append order
    pub fn local_route(&self) -> Vec<RoutePoint> {
        self.transform.iter().map(PoseRecord::route_point).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_at(x: f32, z: f32) -> PoseRecord {
        let mut rows = to_rows(&CameraTransform::identity());
        rows[0][3] = x;
        rows[2][3] = z;
        PoseRecord {
            transform_matrix: rows,
            timestamp_relative: 1.0,
            timestamp: 1_700_000_000_000.0,
            fl_x: 1500.0,
            fl_y: 1500.0,
            camera_angle_x: 1.0,
            camera_angle_y: 0.8,
            cx: 960.0,
            cy: 720.0,
            w: 1920,
            h: 1440,
        }
    }

    #[test]
    fn test_pose_json_keys() {
        let json = serde_json::to_value(pose_at(1.0, 2.0)).unwrap();
        for key in [
            "transformMatrix",
            "timestamp_relative",
            "timestamp",
            "flX",
            "flY",
            "camera_angle_x",
            "camera_angle_y",
            "cx",
            "cy",
            "w",
            "h",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json["transformMatrix"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_imu_json_is_nested() {
        let sample = SensorSample {
            timestamp: 1.0,
            roll: 0.1,
            pitch: 0.2,
            yaw: 0.3,
            rotation_rate: Axis3::new(1.0, 2.0, 3.0),
            gravity: Axis3::new(0.0, -1.0, 0.0),
            user_acceleration: Axis3::default(),
            magnetic_field: Axis3::new(20.0, -5.0, 40.0),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["rotationRate"]["y"], 2.0);
        assert_eq!(json["gravity"]["y"], -1.0);
        assert_eq!(json["magneticField"]["z"], 40.0);
        assert!(json.get("userAcceleration").is_some());
    }

    #[test]
    fn test_route_point_uses_x_and_z() {
        let pose = pose_at(3.0, -4.0);
        assert_eq!(pose.route_point(), RoutePoint::new(3.0, -4.0));
    }

    #[test]
    fn test_payload_shape() {
        let payload = UploadPayload {
            transform: vec![pose_at(0.0, 0.0), pose_at(1.0, 1.0)],
            ..UploadPayload::default()
        };
        assert_eq!(payload.record_count(), 2);
        assert_eq!(payload.local_route().len(), 2);

        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        for key in ["transform", "imu", "gps", "compass"] {
            assert!(json[key].is_array(), "{} should be an array", key);
        }
        assert!(UploadPayload::default().is_empty());
    }
}
