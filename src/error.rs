use thiserror::Error;

/// Capture pipeline error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture already collecting")]
    AlreadyCollecting,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Errors the UI should show to the user; everything else is absorbed
    /// inside the capture pipeline.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, CaptureError::Upload(_) | CaptureError::HttpStatus(_))
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        CaptureError::Internal(format!("Failed to acquire {} lock", what))
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;
