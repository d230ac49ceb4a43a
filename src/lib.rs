//! Multi-stream capture of camera pose, IMU, GPS and compass data into a
//! per-session folder, reassembly into one upload payload, and alignment
//! of the server-reconstructed trajectory onto the recorded route.

pub mod align;
pub mod assembler;
pub mod capture;
pub mod config;
pub mod error;
pub mod formatter;
pub mod session;
pub mod sources;
pub mod storage;
pub mod types;
pub mod upload;

pub use align::{align_to_route, Alignment, PassthroughReason, RouteOverlay, ViewFit};
pub use assembler::{AssemblyReport, PayloadAssembler};
pub use capture::{CaptureEvent, CaptureScheduler, CaptureSources, LocationSink};
pub use config::{CaptureConfig, PoseEncoding, UploadConfig};
pub use error::{CaptureError, CaptureResult};
pub use session::{Session, SessionMetadata, SessionState};
pub use storage::{SessionLayout, SessionWriters, StreamId};
pub use types::{PoseRecord, RoutePoint, UploadPayload};
pub use upload::Uploader;
