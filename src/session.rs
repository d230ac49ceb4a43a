use crate::error::{CaptureError, CaptureResult};
use crate::storage::{SessionLayout, StreamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Folder exists, nothing being captured
    Idle,
    /// Triggers running; `paused` decides whether ticks are kept
    Collecting,
}

/// Session metadata snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub created_at: String,
    pub state: SessionState,
    pub paused: bool,
    pub frame_count: u64,
    pub imu_sample_count: u64,
    pub gps_fix_count: u64,
    pub compass_fix_count: u64,
    pub skipped_sensor_ticks: u64,
    pub dropped_while_paused: u64,
}

/// Outcome of asking the session whether a tick may be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Recorded; carries the stream's new count
    Accepted(u64),
    NotCollecting,
    Paused,
}

/// One capture run and its folder
pub struct Session {
    layout: SessionLayout,
    created_at: DateTime<Utc>,
    metadata: Mutex<SessionMetadata>,
}

impl Session {
    /// New session folder under `base_dir`, named after the current time
    pub fn create(base_dir: impl AsRef<Path>) -> CaptureResult<Self> {
        let created_at = Utc::now();
        let layout = SessionLayout::create(base_dir, &created_at)?;
        Ok(Self::with_layout(layout, created_at))
    }

    pub fn with_layout(layout: SessionLayout, created_at: DateTime<Utc>) -> Self {
        let session_id = layout
            .root()
            .file_name()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| SessionLayout::folder_name(&created_at));

        let metadata = SessionMetadata {
            session_id,
            created_at: created_at.to_rfc3339(),
            state: SessionState::Idle,
            paused: false,
            frame_count: 0,
            imu_sample_count: 0,
            gps_fix_count: 0,
            compass_fix_count: 0,
            skipped_sensor_ticks: 0,
            dropped_while_paused: 0,
        };

        Session {
            layout,
            created_at,
            metadata: Mutex::new(metadata),
        }
    }

    fn meta(&self) -> CaptureResult<MutexGuard<'_, SessionMetadata>> {
        self.metadata.lock().map_err(|_| CaptureError::poisoned("metadata"))
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Idle → Collecting; resets the frame counter
    pub fn start_collecting(&self) -> CaptureResult<()> {
        let mut meta = self.meta()?;
        match meta.state {
            SessionState::Idle => {
                meta.state = SessionState::Collecting;
                meta.paused = false;
                meta.frame_count = 0;
                Ok(())
            }
            SessionState::Collecting => Err(CaptureError::AlreadyCollecting),
        }
    }

    /// Collecting → Idle. Returns false if already idle.
    pub fn stop_collecting(&self) -> CaptureResult<bool> {
        let mut meta = self.meta()?;
        let was_collecting = meta.state == SessionState::Collecting;
        meta.state = SessionState::Idle;
        meta.paused = false;
        Ok(was_collecting)
    }

    pub fn set_paused(&self, paused: bool) -> CaptureResult<()> {
        let mut meta = self.meta()?;
        if meta.state != SessionState::Collecting {
            return Err(CaptureError::InvalidState("Not collecting".to_string()));
        }
        meta.paused = paused;
        Ok(())
    }

    /// Flip pause, returning the new value
    pub fn toggle_pause(&self) -> CaptureResult<bool> {
        let mut meta = self.meta()?;
        if meta.state != SessionState::Collecting {
            return Err(CaptureError::InvalidState("Not collecting".to_string()));
        }
        meta.paused = !meta.paused;
        Ok(meta.paused)
    }

    pub fn state(&self) -> CaptureResult<SessionState> {
        Ok(self.meta()?.state)
    }

    pub fn is_collecting(&self) -> CaptureResult<bool> {
        Ok(self.meta()?.state == SessionState::Collecting)
    }

    pub fn is_paused(&self) -> CaptureResult<bool> {
        Ok(self.meta()?.paused)
    }

    /// Gate one tick of `stream` and count it when accepted.
    ///
    /// With `pause_suppresses_writes` off, a paused session still accepts
    /// ticks; only the flag changes.
    pub fn admit(
        &self,
        stream: StreamId,
        pause_suppresses_writes: bool,
    ) -> CaptureResult<Admission> {
        let mut meta = self.meta()?;
        if meta.state != SessionState::Collecting {
            return Ok(Admission::NotCollecting);
        }
        if meta.paused && pause_suppresses_writes {
            meta.dropped_while_paused += 1;
            return Ok(Admission::Paused);
        }

        let counter = match stream {
            StreamId::Pose => &mut meta.frame_count,
            StreamId::Imu => &mut meta.imu_sample_count,
            StreamId::Gps => &mut meta.gps_fix_count,
            StreamId::Compass => &mut meta.compass_fix_count,
        };
        *counter += 1;
        Ok(Admission::Accepted(*counter))
    }

    /// Sensor tick skipped because the motion gate was closed
    pub fn note_sensor_skip(&self) -> CaptureResult<()> {
        self.meta()?.skipped_sensor_ticks += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> CaptureResult<u64> {
        Ok(self.meta()?.frame_count)
    }

    /// Get metadata snapshot
    pub fn metadata(&self) -> CaptureResult<SessionMetadata> {
        Ok(self.meta()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> Session {
        let created = Utc.with_ymd_and_hms(2024, 9, 25, 10, 0, 0).unwrap();
        Session::with_layout(SessionLayout::new("/tmp/2024-09-25_10-00-00"), created)
    }

    #[test]
    fn test_session_state_transitions() {
        let session = session();

        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert!(!session.is_collecting().unwrap());

        // Idle → Collecting
        session.start_collecting().unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Collecting);

        // pause toggles without leaving Collecting
        assert!(session.toggle_pause().unwrap());
        assert_eq!(session.state().unwrap(), SessionState::Collecting);
        assert!(!session.toggle_pause().unwrap());

        // Collecting → Idle, twice is fine
        assert!(session.stop_collecting().unwrap());
        assert!(!session.stop_collecting().unwrap());
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let session = session();

        // Can't pause while idle
        assert!(session.set_paused(true).is_err());

        // Can't start twice
        session.start_collecting().unwrap();
        assert!(matches!(session.start_collecting(), Err(CaptureError::AlreadyCollecting)));
    }

    #[test]
    fn test_start_resets_frame_counter() {
        let session = session();
        session.start_collecting().unwrap();
        assert_eq!(session.admit(StreamId::Pose, true).unwrap(), Admission::Accepted(1));
        assert_eq!(session.admit(StreamId::Pose, true).unwrap(), Admission::Accepted(2));
        session.stop_collecting().unwrap();

        session.start_collecting().unwrap();
        assert_eq!(session.frame_count().unwrap(), 0);
        assert_eq!(session.admit(StreamId::Pose, true).unwrap(), Admission::Accepted(1));
    }

    #[test]
    fn test_admission_follows_pause_policy() {
        let session = session();
        assert_eq!(session.admit(StreamId::Imu, true).unwrap(), Admission::NotCollecting);

        session.start_collecting().unwrap();
        session.set_paused(true).unwrap();
        assert_eq!(session.admit(StreamId::Imu, true).unwrap(), Admission::Paused);
        assert_eq!(session.admit(StreamId::Imu, false).unwrap(), Admission::Accepted(1));

        let meta = session.metadata().unwrap();
        assert_eq!(meta.imu_sample_count, 1);
        assert_eq!(meta.dropped_while_paused, 1);
        assert_eq!(meta.session_id, "2024-09-25_10-00-00");
    }
}
