//! Error types and handling
//!
//! Common error types used across the capture session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while acquiring sources or driving a recording session
#[derive(Error, Debug)]
pub enum RecordingError {
    /// The user dismissed the screen picker
    #[error("Screen selection was cancelled")]
    UserCancelled,

    #[error("Permission denied: {0}")]
    DeviceDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device in use: {0}")]
    DeviceInUse(String),

    #[error("Compositor initialization failed: {0}")]
    CompositorInitFailed(String),

    #[error("Audio graph failed: {0}")]
    AudioGraphFailed(String),

    #[error("Encoder failure: {0}")]
    EncoderFailure(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Audio settings are locked while a session is active")]
    SettingsLocked,

    #[error("Session was torn down before it finished starting")]
    SessionTornDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecordingError {
    /// Device failures only disable the affected feature; everything else aborts.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RecordingError::DeviceDenied(_)
                | RecordingError::DeviceNotFound(_)
                | RecordingError::DeviceInUse(_)
        )
    }

    /// Stable code used in [`ErrorResponse`]
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::UserCancelled => "USER_CANCELLED",
            RecordingError::DeviceDenied(_) => "DEVICE_DENIED",
            RecordingError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            RecordingError::DeviceInUse(_) => "DEVICE_IN_USE",
            RecordingError::CompositorInitFailed(_) => "COMPOSITOR_INIT_FAILED",
            RecordingError::AudioGraphFailed(_) => "AUDIO_GRAPH_FAILED",
            RecordingError::EncoderFailure(_) => "ENCODER_FAILURE",
            RecordingError::AlreadyRecording => "ALREADY_RECORDING",
            RecordingError::NotRecording => "NOT_RECORDING",
            RecordingError::SettingsLocked => "SETTINGS_LOCKED",
            RecordingError::SessionTornDown => "SESSION_TORN_DOWN",
            RecordingError::Config(_) => "CONFIG_ERROR",
            RecordingError::InvalidArtifact(_) => "INVALID_ARTIFACT",
            RecordingError::Io(_) => "IO_ERROR",
            RecordingError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecordingError> for ErrorResponse {
    fn from(error: RecordingError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_are_recoverable() {
        assert!(RecordingError::DeviceDenied("camera".into()).is_recoverable());
        assert!(RecordingError::DeviceNotFound("mic".into()).is_recoverable());
        assert!(RecordingError::DeviceInUse("camera".into()).is_recoverable());
        assert!(!RecordingError::UserCancelled.is_recoverable());
        assert!(!RecordingError::CompositorInitFailed("no video".into()).is_recoverable());
    }

    #[test]
    fn test_error_response_code() {
        let response: ErrorResponse = RecordingError::EncoderFailure("disk full".into()).into();
        assert_eq!(response.code, "ENCODER_FAILURE");
        assert!(response.message.contains("disk full"));
    }
}
