//! Capture trait definitions
//!
//! Platform-agnostic acquirer trait and device descriptions.

use super::source::CaptureSource;
use crate::utils::error::RecordingResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Unique display ID
    pub id: u32,

    /// Display name
    pub name: String,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Scale factor (e.g., 2.0 for Retina)
    pub scale_factor: f64,

    /// Whether this is the primary display
    pub is_primary: bool,

    /// Refresh rate in Hz (if available)
    pub refresh_rate: Option<u32>,
}

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Whether this is an input device
    pub is_input: bool,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Acquires live sources on behalf of a recording session.
///
/// Every acquisition may suspend for as long as a permission prompt or
/// picker stays open; there is no timeout. System audio has no acquirer of
/// its own: it arrives as audio tracks on the screen source, when granted.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Let the user pick a screen, window or tab.
    ///
    /// Returns `RecordingError::UserCancelled` when the picker is dismissed.
    /// The returned source may lack audio even if `include_system_audio` was set.
    async fn acquire_screen(&self, include_system_audio: bool) -> RecordingResult<CaptureSource>;

    /// Open a video-only camera device
    async fn acquire_camera(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource>;

    /// Open an audio-only microphone with echo cancellation and noise suppression where supported
    async fn acquire_microphone(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource>;

    /// Displays the screen picker can offer
    fn list_displays(&self) -> Vec<DisplayInfo> {
        Vec::new()
    }

    /// Available microphones
    fn list_audio_inputs(&self) -> Vec<AudioDeviceInfo> {
        Vec::new()
    }

    /// Available cameras
    fn list_cameras(&self) -> Vec<CameraInfo> {
        Vec::new()
    }
}
