//! Synthetic sources for desk runs and tests, in place of a real AR
//! session, motion manager and location manager.

use super::{
    Attitude, CameraFrame, FrameSource, HeadingReading, LocationProvider, LocationReading,
    MotionReadings, MotionSource, MotionStatus, SensorState,
};
use crate::capture::LocationSink;
use crate::types::{Axis3, CameraIntrinsics, CameraTransform};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Walks the camera around a circle on the ground plane
pub struct SimulatedFrameSource {
    started: Instant,
    radius: f32,
    lap: Duration,
}

impl SimulatedFrameSource {
    pub fn new(radius: f32, lap: Duration) -> Self {
        SimulatedFrameSource {
            started: Instant::now(),
            radius,
            lap,
        }
    }

    fn frame_at(&self, t: f64) -> CameraFrame {
        let angle = 2.0 * PI * t / self.lap.as_secs_f64().max(1e-3);
        let mut transform = CameraTransform::identity();
        transform[(0, 3)] = self.radius * angle.cos() as f32;
        transform[(1, 3)] = 1.4;
        transform[(2, 3)] = self.radius * angle.sin() as f32;

        let intrinsics = CameraIntrinsics::new(
            1500.0, 0.0, 960.0, //
            0.0, 1500.0, 720.0, //
            0.0, 0.0, 1.0,
        );

        CameraFrame {
            transform,
            intrinsics,
            image_width: 1920,
            image_height: 1440,
            timestamp: t,
        }
    }
}

impl Default for SimulatedFrameSource {
    fn default() -> Self {
        Self::new(5.0, Duration::from_secs(60))
    }
}

impl FrameSource for SimulatedFrameSource {
    fn latest_frame(&self) -> Option<CameraFrame> {
        Some(self.frame_at(self.started.elapsed().as_secs_f64()))
    }
}

/// Motion manager stand-in: sensors are available, active only between
/// `start_updates` and `stop_updates`
pub struct SimulatedMotion {
    active: AtomicBool,
    counter: AtomicU64,
}

impl SimulatedMotion {
    pub fn new() -> Self {
        SimulatedMotion {
            active: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SimulatedMotion {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionSource for SimulatedMotion {
    fn start_updates(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop_updates(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn status(&self) -> MotionStatus {
        let state = SensorState {
            available: true,
            active: self.active.load(Ordering::SeqCst),
        };
        MotionStatus {
            accelerometer: state,
            gyroscope: state,
            device_motion: state,
            magnetometer: state,
        }
    }

    fn readings(&self) -> MotionReadings {
        let t = self.counter.fetch_add(1, Ordering::Relaxed) as f64 * 0.01;
        let rate = Axis3::new(
            (t * 0.5).sin() * 0.05,
            (t * 0.3).cos() * 0.03,
            (t * 1.0).sin() * 0.1,
        );

        MotionReadings {
            attitude: Some(Attitude {
                roll: (t * 0.2).sin() * 0.05,
                pitch: (t * 0.2).cos() * 0.05,
                yaw: (t * 0.1) % (2.0 * PI) - PI,
            }),
            rotation_rate: Some(rate),
            gyro_rate: Some(rate),
            gravity: Some(Axis3::new(0.0, -1.0, 0.0)),
            user_acceleration: Some(Axis3::new(
                (t * 2.0 * PI).sin() * 0.05,
                (t * 2.0 * PI).cos() * 0.03,
                (t * PI).sin() * 0.01,
            )),
            magnetic_field: Some(Axis3::new(22.0, -4.5, 41.0)),
        }
    }
}

/// Pushes a GPS fix every second and a heading every 200 ms from a tokio
/// task while updates are running
pub struct SimulatedLocation {
    origin: (f64, f64),
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        SimulatedLocation {
            origin: (latitude, longitude),
            task: Mutex::new(None),
        }
    }
}

impl Default for SimulatedLocation {
    fn default() -> Self {
        Self::new(22.3364, 114.2655)
    }
}

impl LocationProvider for SimulatedLocation {
    fn start_updates(&self, sink: LocationSink) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("Simulated location needs a tokio runtime, no updates will be pushed");
                return;
            }
        };

        let (lat0, lon0) = self.origin;
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(200));
            let mut seq = 0u64;
            loop {
                ticker.tick().await;
                let s = seq as f64;
                sink.on_heading(HeadingReading {
                    x: (s * 0.05).cos() * 30.0,
                    y: (s * 0.05).sin() * 30.0,
                    z: -12.0,
                });
                if seq % 5 == 0 {
                    sink.on_location(LocationReading {
                        latitude: lat0 + s * 0.000_002,
                        longitude: lon0 + s * 0.000_002,
                        altitude: 12.0 + (s * 0.1).sin(),
                        vertical_accuracy: 3.0,
                        horizontal_accuracy: 5.0 + (s * 0.1).sin() * 2.0,
                    });
                }
                seq += 1;
            }
        });

        match self.task.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => handle.abort(),
        }
    }

    fn stop_updates(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_walks_circle() {
        let source = SimulatedFrameSource::new(2.0, Duration::from_secs(4));
        let start = source.frame_at(0.0);
        let quarter = source.frame_at(1.0);

        assert!((start.transform[(0, 3)] - 2.0).abs() < 1e-5);
        assert!(start.transform[(2, 3)].abs() < 1e-5);
        assert!(quarter.transform[(0, 3)].abs() < 1e-5);
        assert!((quarter.transform[(2, 3)] - 2.0).abs() < 1e-5);
        assert_eq!(start.intrinsics[(0, 2)], 960.0);
    }

    #[test]
    fn test_motion_active_only_while_started() {
        let motion = SimulatedMotion::new();
        assert!(!motion.status().is_ready());

        motion.start_updates();
        assert!(motion.status().is_ready());
        assert!(motion.readings().magnetic_field.is_some());

        motion.stop_updates();
        assert!(!motion.status().is_ready());
    }
}
