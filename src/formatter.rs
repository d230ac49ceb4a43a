//! Fixed-schema encoders for each stream and the forgiving decoders the
//! payload assembler uses on the way back.
//!
//! Line layouts (comma separated, no header):
//! - IMU, 16 fields: `ts_ms,roll,pitch,yaw`, then x/y/z of rotation rate,
//!   gravity, user acceleration and magnetic field; integer ms then 4
//!   fractional digits for every value
//! - GPS, 6 fields: `ts_ms,lat,lon,alt,vertical_acc,horizontal_acc`
//! - Compass, 4 fields: `ts_ms,x,y,z`

use crate::error::CaptureResult;
use crate::sources::{CameraFrame, MotionReadings};
use crate::types::{to_rows, Axis3, CompassFix, GpsFix, PoseRecord, SensorSample};

pub const IMU_FIELDS: usize = 16;
pub const GPS_FIELDS: usize = 6;
pub const COMPASS_FIELDS: usize = 4;

/// Horizontal/vertical field of view from a focal length in pixels
pub fn focal_to_fov(focal: f32, pixels: u32) -> f32 {
    if focal <= 0.0 {
        return 0.0;
    }
    2.0 * (pixels as f32 / (2.0 * focal)).atan()
}

/// Pose record from an AR frame, stamped with wall-clock ms
pub fn pose_record(frame: &CameraFrame, wall_ms: f64) -> PoseRecord {
    let k = &frame.intrinsics;
    let fl_x = k[(0, 0)];
    let fl_y = k[(1, 1)];

    PoseRecord {
        transform_matrix: to_rows(&frame.transform),
        timestamp_relative: frame.timestamp,
        timestamp: wall_ms,
        fl_x,
        fl_y,
        camera_angle_x: focal_to_fov(fl_x, frame.image_width),
        camera_angle_y: focal_to_fov(fl_y, frame.image_height),
        cx: k[(0, 2)],
        cy: k[(1, 2)],
        w: frame.image_width,
        h: frame.image_height,
    }
}

/// Compact single-line JSON, valid both as an NDJSON line and as an
/// element of the legacy array file
pub fn encode_pose(record: &PoseRecord) -> CaptureResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Builds the sample only when every sub-reading is present
pub fn sensor_sample(timestamp_ms: i64, readings: &MotionReadings) -> Option<SensorSample> {
    let attitude = readings.attitude?;
    let rotation_rate = readings.rotation_rate?;
    readings.gyro_rate?;
    let gravity = readings.gravity?;
    let user_acceleration = readings.user_acceleration?;
    let magnetic_field = readings.magnetic_field?;

    Some(SensorSample {
        timestamp: timestamp_ms as f64,
        roll: attitude.roll,
        pitch: attitude.pitch,
        yaw: attitude.yaw,
        rotation_rate,
        gravity,
        user_acceleration,
        magnetic_field,
    })
}

pub fn format_sensor_sample(sample: &SensorSample) -> String {
    let r = &sample.rotation_rate;
    let g = &sample.gravity;
    let a = &sample.user_acceleration;
    let m = &sample.magnetic_field;
    format!(
        "{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},\
         {:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
        sample.timestamp as i64,
        sample.roll,
        sample.pitch,
        sample.yaw,
        r.x,
        r.y,
        r.z,
        g.x,
        g.y,
        g.z,
        a.x,
        a.y,
        a.z,
        m.x,
        m.y,
        m.z
    )
}

/// IMU line for one sensor tick, `None` if any sub-reading is missing
pub fn format_sensor_line(timestamp_ms: i64, readings: &MotionReadings) -> Option<String> {
    sensor_sample(timestamp_ms, readings).map(|sample| format_sensor_sample(&sample))
}

pub fn format_gps_line(fix: &GpsFix) -> String {
    format!(
        "{},{},{},{},{},{}",
        fix.timestamp,
        fix.latitude,
        fix.longitude,
        fix.altitude,
        fix.vertical_accuracy,
        fix.horizontal_accuracy
    )
}

pub fn format_compass_line(fix: &CompassFix) -> String {
    format!("{},{},{},{}", fix.timestamp, fix.x, fix.y, fix.z)
}

/// Splits a line into exactly `N` finite numbers
fn parse_fields<const N: usize>(line: &str) -> Option<[f64; N]> {
    let mut values = [0.0f64; N];
    let mut parts = line.trim_end_matches('\r').split(',');
    for slot in values.iter_mut() {
        let value: f64 = parts.next()?.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        *slot = value;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(values)
}

pub fn parse_sensor_line(line: &str) -> Option<SensorSample> {
    let v = parse_fields::<IMU_FIELDS>(line)?;
    Some(SensorSample {
        timestamp: v[0],
        roll: v[1],
        pitch: v[2],
        yaw: v[3],
        rotation_rate: Axis3::new(v[4], v[5], v[6]),
        gravity: Axis3::new(v[7], v[8], v[9]),
        user_acceleration: Axis3::new(v[10], v[11], v[12]),
        magnetic_field: Axis3::new(v[13], v[14], v[15]),
    })
}

pub fn parse_gps_line(line: &str) -> Option<GpsFix> {
    let v = parse_fields::<GPS_FIELDS>(line)?;
    Some(GpsFix {
        timestamp: v[0],
        latitude: v[1],
        longitude: v[2],
        altitude: v[3],
        vertical_accuracy: v[4],
        horizontal_accuracy: v[5],
    })
}

pub fn parse_compass_line(line: &str) -> Option<CompassFix> {
    let v = parse_fields::<COMPASS_FIELDS>(line)?;
    Some(CompassFix {
        timestamp: v[0],
        x: v[1],
        y: v[2],
        z: v[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Attitude;
    use crate::types::{CameraIntrinsics, CameraTransform};
    use approx::assert_abs_diff_eq;

    fn full_readings() -> MotionReadings {
        MotionReadings {
            attitude: Some(Attitude {
                roll: 0.123456,
                pitch: -0.5,
                yaw: 3.14159265,
            }),
            rotation_rate: Some(Axis3::new(0.01, -0.02, 0.03)),
            gyro_rate: Some(Axis3::new(0.0, 0.0, 0.0)),
            gravity: Some(Axis3::new(0.0, -0.99999, 0.00004)),
            user_acceleration: Some(Axis3::new(0.25, 0.5, -0.75)),
            magnetic_field: Some(Axis3::new(-21.33336, 4.5, 40.0)),
        }
    }

    #[test]
    fn test_sensor_line_layout() {
        let line = format_sensor_line(1_700_000_000_123, &full_readings()).unwrap();
        let fields: Vec<&str> = line.split(',').collect();

        assert_eq!(fields.len(), IMU_FIELDS);
        assert_eq!(fields[0], "1700000000123");
        assert_eq!(fields[1], "0.1235");
        assert_eq!(fields[3], "3.1416");
        assert_eq!(fields[8], "-1.0000");
        assert_eq!(fields[13], "-21.3334");
        for field in &fields[1..] {
            let decimals = field.split('.').nth(1).unwrap();
            assert_eq!(decimals.len(), 4, "field {} should have 4 decimals", field);
        }
    }

    #[test]
    fn test_missing_sub_reading_emits_nothing() {
        let mut readings = full_readings();
        readings.magnetic_field = None;
        assert!(format_sensor_line(0, &readings).is_none());

        let mut readings = full_readings();
        readings.gyro_rate = None;
        assert!(format_sensor_line(0, &readings).is_none());

        assert!(format_sensor_line(0, &MotionReadings::default()).is_none());
    }

    #[test]
    fn test_sensor_line_round_trip_at_stored_precision() {
        let readings = full_readings();
        let line = format_sensor_line(42, &readings).unwrap();
        let sample = parse_sensor_line(&line).unwrap();

        assert_eq!(sample.timestamp, 42.0);
        assert_abs_diff_eq!(sample.roll, 0.123456, epsilon = 5e-5);
        assert_abs_diff_eq!(sample.yaw, 3.14159265, epsilon = 5e-5);
        assert_abs_diff_eq!(sample.rotation_rate.y, -0.02, epsilon = 5e-5);
        assert_abs_diff_eq!(sample.gravity.z, 0.0, epsilon = 5e-5);
        assert_abs_diff_eq!(sample.user_acceleration.z, -0.75, epsilon = 5e-5);
        assert_abs_diff_eq!(sample.magnetic_field.x, -21.33336, epsilon = 5e-5);
    }

    #[test]
    fn test_gps_and_compass_lines() {
        let fix = GpsFix {
            timestamp: 1_700_000_000_000.5,
            latitude: 22.336412,
            longitude: 114.265511,
            altitude: 12.25,
            vertical_accuracy: 3.0,
            horizontal_accuracy: 4.7,
        };
        let line = format_gps_line(&fix);
        assert_eq!(line.split(',').count(), GPS_FIELDS);
        assert_eq!(parse_gps_line(&line).unwrap(), fix);

        let heading = CompassFix {
            timestamp: 5.0,
            x: -30.5,
            y: 12.0,
            z: 0.125,
        };
        let line = format_compass_line(&heading);
        assert_eq!(line, "5,-30.5,12,0.125");
        assert_eq!(parse_compass_line(&line).unwrap(), heading);
    }

    #[test]
    fn test_parsers_reject_malformed_lines() {
        assert!(parse_gps_line("1,2,3,4,5").is_none());
        assert!(parse_gps_line("1,2,3,4,5,6,7").is_none());
        assert!(parse_gps_line("1,2,x,4,5,6").is_none());
        assert!(parse_gps_line("1,2,NaN,4,5,6").is_none());
        assert!(parse_compass_line("").is_none());
        assert!(parse_compass_line("1,2,3,").is_none());
        assert!(parse_compass_line("1,2,3,4\r").is_some());
        assert!(parse_sensor_line("garbage").is_none());
    }

    #[test]
    fn test_pose_record_from_frame() {
        let mut transform = CameraTransform::identity();
        transform[(0, 3)] = 1.0;
        transform[(2, 3)] = -3.0;
        let frame = CameraFrame {
            transform,
            intrinsics: CameraIntrinsics::new(
                1000.0, 0.0, 640.0, 0.0, 1000.0, 360.0, 0.0, 0.0, 1.0,
            ),
            image_width: 2000,
            image_height: 720,
            timestamp: 12.5,
        };

        let record = pose_record(&frame, 1_700_000_000_000.0);
        assert_eq!(record.transform_matrix[0][3], 1.0);
        assert_eq!(record.transform_matrix[2][3], -3.0);
        assert_eq!((record.cx, record.cy), (640.0, 360.0));
        assert_eq!((record.w, record.h), (2000, 720));
        // 2000 px at f=1000 is a 90 degree horizontal FOV
        assert_abs_diff_eq!(record.camera_angle_x, std::f32::consts::FRAC_PI_2, epsilon = 1e-6);

        let json = encode_pose(&record).unwrap();
        assert!(!json.contains('\n'));
        let back: PoseRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_focal_to_fov_guards_zero_focal() {
        assert_eq!(focal_to_fov(0.0, 1920), 0.0);
        assert!(focal_to_fov(1500.0, 0).abs() < 1e-9);
    }
}
