//! Recording state management
//!
//! Session phases, the observable recording snapshot, audio routing settings
//! and the events broadcast to the host UI.

use crate::capture::source::SourceKind;
use crate::utils::error::RecordingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No session
    #[default]
    Idle,
    /// Acquiring sources and building the pipeline
    Acquiring,
    /// Live, encoder running
    Recording,
    /// Live, encoder paused
    Paused,
    /// Stop requested, waiting for the encoder to deliver its last chunk
    Finalizing,
    /// A fatal error is being cleaned up; settles to `Idle`
    Error,
}

impl SessionPhase {
    /// Recording or paused
    pub fn is_live(&self) -> bool {
        matches!(self, SessionPhase::Recording | SessionPhase::Paused)
    }
}

/// Snapshot published to observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub is_recording: bool,
    pub is_paused: bool,
    /// Displayed elapsed time; frozen while paused
    pub duration_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
}

/// Which audio inputs are captured. Locked while a session is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioRoutingSettings {
    pub microphone_enabled: bool,
    pub system_audio_enabled: bool,
    pub microphone_device_id: Option<String>,
}

impl Default for AudioRoutingSettings {
    fn default() -> Self {
        Self {
            microphone_enabled: true,
            system_audio_enabled: true,
            microphone_device_id: None,
        }
    }
}

/// Partial update for [`AudioRoutingSettings`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioRoutingPatch {
    pub microphone_enabled: Option<bool>,
    pub system_audio_enabled: Option<bool>,
    /// `Some(None)` selects the default device
    pub microphone_device_id: Option<Option<String>>,
}

impl AudioRoutingSettings {
    pub fn apply(&mut self, patch: &AudioRoutingPatch) {
        if let Some(enabled) = patch.microphone_enabled {
            self.microphone_enabled = enabled;
        }
        if let Some(enabled) = patch.system_audio_enabled {
            self.system_audio_enabled = enabled;
        }
        if let Some(device) = &patch.microphone_device_id {
            self.microphone_device_id = device.clone();
        }
    }
}

/// A degraded feature reported during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureWarning {
    pub source: SourceKind,
    pub code: String,
    pub message: String,
}

impl CaptureWarning {
    pub fn new(source: SourceKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn from_error(source: SourceKind, error: &RecordingError) -> Self {
        Self::new(source, error.code(), error.to_string())
    }
}

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Stop requested, waiting for the last chunk
    Finalizing,
    /// Artifact delivered
    Stopped { duration_seconds: u64 },
    /// A feature was disabled but the session continues
    Warning(CaptureWarning),
    /// Fatal error; the session has been torn down
    Error(String),
    /// Displayed duration in seconds
    Progress(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_patch_only_touches_given_fields() {
        let mut settings = AudioRoutingSettings {
            microphone_device_id: Some("usb-mic".into()),
            ..AudioRoutingSettings::default()
        };
        settings.apply(&AudioRoutingPatch {
            system_audio_enabled: Some(false),
            ..AudioRoutingPatch::default()
        });

        assert!(settings.microphone_enabled);
        assert!(!settings.system_audio_enabled);
        assert_eq!(settings.microphone_device_id.as_deref(), Some("usb-mic"));

        settings.apply(&AudioRoutingPatch {
            microphone_device_id: Some(None),
            ..AudioRoutingPatch::default()
        });
        assert_eq!(settings.microphone_device_id, None);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = RecordingState {
            is_recording: true,
            duration_seconds: 3,
            ..RecordingState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isRecording"], true);
        assert_eq!(json["durationSeconds"], 3);
    }

    #[test]
    fn test_warning_from_device_error() {
        let warning = CaptureWarning::from_error(
            SourceKind::Camera,
            &RecordingError::DeviceInUse("FaceTime HD".into()),
        );
        assert_eq!(warning.code, "DEVICE_IN_USE");
        assert_eq!(warning.source, SourceKind::Camera);
    }
}
