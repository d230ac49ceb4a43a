//! Narrow views of the platform collaborators: AR frames, device motion
//! and the location provider.

pub mod simulated;

use crate::capture::LocationSink;
use crate::types::{Axis3, CameraIntrinsics, CameraTransform};

pub use simulated::{SimulatedFrameSource, SimulatedLocation, SimulatedMotion};

/// Latest AR frame: pose, intrinsics and image size
#[derive(Clone, Debug, PartialEq)]
pub struct CameraFrame {
    pub transform: CameraTransform,
    pub intrinsics: CameraIntrinsics,
    pub image_width: u32,
    pub image_height: u32,
    /// Seconds on the AR session clock
    pub timestamp: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensorState {
    pub available: bool,
    pub active: bool,
}

impl SensorState {
    pub const READY: SensorState = SensorState {
        available: true,
        active: true,
    };

    pub fn is_ready(&self) -> bool {
        self.available && self.active
    }
}

/// Availability gate for the four motion sensors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionStatus {
    pub accelerometer: SensorState,
    pub gyroscope: SensorState,
    pub device_motion: SensorState,
    pub magnetometer: SensorState,
}

impl MotionStatus {
    pub fn all_ready() -> Self {
        MotionStatus {
            accelerometer: SensorState::READY,
            gyroscope: SensorState::READY,
            device_motion: SensorState::READY,
            magnetometer: SensorState::READY,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.accelerometer.is_ready()
            && self.gyroscope.is_ready()
            && self.device_motion.is_ready()
            && self.magnetometer.is_ready()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Most recent value of each motion sub-reading, `None` until the
/// platform has delivered one
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionReadings {
    pub attitude: Option<Attitude>,
    pub rotation_rate: Option<Axis3>,
    /// Raw gyro; only gated on, the fused `rotation_rate` is what gets logged
    pub gyro_rate: Option<Axis3>,
    pub gravity: Option<Axis3>,
    pub user_acceleration: Option<Axis3>,
    pub magnetic_field: Option<Axis3>,
}

/// Location update before it is stamped with wall-clock time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationReading {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub vertical_accuracy: f64,
    pub horizontal_accuracy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadingReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// AR subsystem; pose estimation is a black box behind this
pub trait FrameSource: Send + Sync {
    fn latest_frame(&self) -> Option<CameraFrame>;
}

pub trait MotionSource: Send + Sync {
    fn start_updates(&self);
    fn stop_updates(&self);
    fn status(&self) -> MotionStatus;
    fn readings(&self) -> MotionReadings;
}

/// Push-driven GPS/heading provider. Updates go to the sink handed over
/// in `start_updates` until `stop_updates`.
pub trait LocationProvider: Send + Sync {
    fn start_updates(&self, sink: LocationSink);
    fn stop_updates(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_gate_requires_every_sensor() {
        let mut status = MotionStatus::all_ready();
        assert!(status.is_ready());

        status.accelerometer.active = false;
        assert!(!status.is_ready());

        status = MotionStatus::all_ready();
        status.magnetometer.available = false;
        assert!(!status.is_ready());

        assert!(!MotionStatus::default().is_ready());
    }
}
