//! Capture scheduler: a pose trigger (~1 Hz) and a sensor trigger (~100 Hz)
//! running as independent tokio tasks, plus a push path for location and
//! heading updates.
//!
//! Ticks format their record and hand it to the stream's writer thread
//! without waiting. The UI side never runs capture work; it only receives
//! [`CaptureEvent`]s.

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::formatter;
use crate::session::{Admission, Session};
use crate::sources::{FrameSource, HeadingReading, LocationProvider, LocationReading, MotionSource};
use crate::storage::{SessionWriters, StreamId};
use crate::types::{CompassFix, GpsFix, RoutePoint};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Notifications for the UI owner
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started { session_id: String },
    FrameCaptured { frame_count: u64, position: RoutePoint },
    PauseChanged { paused: bool },
    Stopped { frame_count: u64 },
}

/// Platform collaborators the scheduler pulls from / subscribes to
#[derive(Clone)]
pub struct CaptureSources {
    pub frames: Arc<dyn FrameSource>,
    pub motion: Arc<dyn MotionSource>,
    pub location: Arc<dyn LocationProvider>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Pose,
    Sensor,
}

fn wall_clock_ms() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

struct CaptureCore {
    config: CaptureConfig,
    session: Arc<Session>,
    writers: Arc<SessionWriters>,
    frames: Arc<dyn FrameSource>,
    motion: Arc<dyn MotionSource>,
    events: Option<UnboundedSender<CaptureEvent>>,
}

impl CaptureCore {
    fn emit(&self, event: CaptureEvent) {
        if let Some(tx) = &self.events {
            // receiver gone just means nobody is watching
            let _ = tx.send(event);
        }
    }

    fn admit(&self, stream: StreamId) -> CaptureResult<Option<u64>> {
        match self.session.admit(stream, self.config.pause_suppresses_writes)? {
            Admission::Accepted(count) => Ok(Some(count)),
            Admission::NotCollecting | Admission::Paused => Ok(None),
        }
    }

    fn pose_tick(&self) -> CaptureResult<bool> {
        let frame = match self.frames.latest_frame() {
            Some(frame) => frame,
            None => return Ok(false),
        };
        if !self.session.is_collecting()? {
            return Ok(false);
        }

        let record = formatter::pose_record(&frame, wall_clock_ms());
        let entry = formatter::encode_pose(&record)?;

        let frame_count = match self.admit(StreamId::Pose)? {
            Some(count) => count,
            None => return Ok(false),
        };
        self.writers.append(StreamId::Pose, entry);
        self.emit(CaptureEvent::FrameCaptured {
            frame_count,
            position: record.route_point(),
        });
        Ok(true)
    }

    fn sensor_tick(&self) -> CaptureResult<bool> {
        if !self.session.is_collecting()? {
            return Ok(false);
        }
        if !self.motion.status().is_ready() {
            self.session.note_sensor_skip()?;
            return Ok(false);
        }

        let timestamp_ms = Utc::now().timestamp_millis();
        let line = match formatter::format_sensor_line(timestamp_ms, &self.motion.readings()) {
            Some(line) => line,
            None => {
                self.session.note_sensor_skip()?;
                return Ok(false);
            }
        };

        if self.admit(StreamId::Imu)?.is_none() {
            return Ok(false);
        }
        self.writers.append(StreamId::Imu, line);
        Ok(true)
    }

    fn record_location(&self, reading: LocationReading) -> CaptureResult<bool> {
        if self.admit(StreamId::Gps)?.is_none() {
            return Ok(false);
        }
        let fix = GpsFix {
            timestamp: wall_clock_ms(),
            latitude: reading.latitude,
            longitude: reading.longitude,
            altitude: reading.altitude,
            vertical_accuracy: reading.vertical_accuracy,
            horizontal_accuracy: reading.horizontal_accuracy,
        };
        self.writers.append(StreamId::Gps, formatter::format_gps_line(&fix));
        Ok(true)
    }

    fn record_heading(&self, reading: HeadingReading) -> CaptureResult<bool> {
        if self.admit(StreamId::Compass)?.is_none() {
            return Ok(false);
        }
        let fix = CompassFix {
            timestamp: wall_clock_ms(),
            x: reading.x,
            y: reading.y,
            z: reading.z,
        };
        self.writers.append(StreamId::Compass, formatter::format_compass_line(&fix));
        Ok(true)
    }
}

async fn run_trigger(core: Arc<CaptureCore>, trigger: Trigger, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let result = match trigger {
            Trigger::Pose => core.pose_tick(),
            Trigger::Sensor => core.sensor_tick(),
        };
        if let Err(e) = result {
            log::warn!("{:?} tick failed: {}", trigger, e);
        }
    }
}

/// Handle given to the location provider; updates are appended as they
/// arrive, independent of the two triggers
#[derive(Clone)]
pub struct LocationSink {
    core: Arc<CaptureCore>,
}

impl LocationSink {
    pub fn on_location(&self, reading: LocationReading) {
        if let Err(e) = self.core.record_location(reading) {
            log::warn!("Dropping location update: {}", e);
        }
    }

    pub fn on_heading(&self, reading: HeadingReading) {
        if let Err(e) = self.core.record_heading(reading) {
            log::warn!("Dropping heading update: {}", e);
        }
    }
}

/// Drives one session: `Idle → Collecting → Idle`
pub struct CaptureScheduler {
    core: Arc<CaptureCore>,
    location: Arc<dyn LocationProvider>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
}

impl CaptureScheduler {
    pub fn new(
        config: CaptureConfig,
        session: Arc<Session>,
        writers: Arc<SessionWriters>,
        sources: CaptureSources,
        events: Option<UnboundedSender<CaptureEvent>>,
    ) -> Self {
        let core = CaptureCore {
            config,
            session,
            writers,
            frames: sources.frames,
            motion: sources.motion,
            events,
        };
        CaptureScheduler {
            core: Arc::new(core),
            location: sources.location,
            triggers: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.core.session
    }

    pub fn writers(&self) -> &Arc<SessionWriters> {
        &self.core.writers
    }

    pub fn location_sink(&self) -> LocationSink {
        LocationSink {
            core: Arc::clone(&self.core),
        }
    }

    /// Reset the frame counter, start providers and both triggers.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> CaptureResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CaptureError::InvalidState("capture needs a tokio runtime".to_string()))?;
        let mut triggers = self.triggers.lock().map_err(|_| CaptureError::poisoned("trigger"))?;

        self.core.session.start_collecting()?;
        self.core.motion.start_updates();
        self.location.start_updates(self.location_sink());

        let config = &self.core.config;
        for (trigger, period) in [
            (Trigger::Pose, config.pose_interval()),
            (Trigger::Sensor, config.sensor_interval()),
        ] {
            triggers.push(runtime.spawn(run_trigger(Arc::clone(&self.core), trigger, period)));
        }

        let metadata = self.core.session.metadata()?;
        log::info!(
            "Capture started in {} (pose every {:?}, sensors every {:?})",
            self.core.session.layout().root().display(),
            config.pose_interval(),
            config.sensor_interval()
        );
        self.core.emit(CaptureEvent::Started {
            session_id: metadata.session_id,
        });
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) -> CaptureResult<()> {
        self.core.session.set_paused(paused)?;
        self.core.emit(CaptureEvent::PauseChanged { paused });
        Ok(())
    }

    pub fn toggle_pause(&self) -> CaptureResult<bool> {
        let paused = self.core.session.toggle_pause()?;
        if !self.core.config.pause_suppresses_writes {
            log::debug!("Pause is advisory only, ticks keep writing");
        }
        self.core.emit(CaptureEvent::PauseChanged { paused });
        Ok(paused)
    }

    /// Cancel the triggers and stop providers. Safe to call when idle.
    /// Queued appends are not waited for.
    pub fn stop(&self) -> CaptureResult<()> {
        let was_collecting = self.core.session.stop_collecting()?;
        self.abort_triggers();

        if was_collecting {
            self.core.motion.stop_updates();
            self.location.stop_updates();

            let frame_count = self.core.session.frame_count()?;
            log::info!(
                "Capture stopped after {} frames, {} entries still queued",
                frame_count,
                self.core.writers.pending()
            );
            self.core.emit(CaptureEvent::Stopped { frame_count });
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.triggers.lock().map(|t| !t.is_empty()).unwrap_or(false)
    }

    /// Fire the pose trigger once; true if a record was queued
    pub fn pose_tick(&self) -> CaptureResult<bool> {
        self.core.pose_tick()
    }

    /// Fire the sensor trigger once; true if a record was queued
    pub fn sensor_tick(&self) -> CaptureResult<bool> {
        self.core.sensor_tick()
    }

    fn abort_triggers(&self) {
        if let Ok(mut triggers) = self.triggers.lock() {
            for handle in triggers.drain(..) {
                handle.abort();
            }
        }
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.abort_triggers();
    }
}
