//! Native device acquirers
//!
//! Microphone capture through cpal (`microphone-cpal`) and camera capture
//! through nokhwa (`camera-nokhwa`). Screen selection stays with the wrapped
//! backend, since picking a display is platform UI.

#[cfg(feature = "camera-nokhwa")]
pub mod camera;
#[cfg(feature = "microphone-cpal")]
pub mod microphone;

use super::source::CaptureSource;
use super::traits::{AudioDeviceInfo, CameraInfo, CaptureBackend, DisplayInfo};
use crate::utils::error::RecordingResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend that opens real microphones and cameras, delegating screen
/// selection (and any device family without a native feature) to `screen`.
pub struct NativeBackend {
    screen: Arc<dyn CaptureBackend>,
}

impl NativeBackend {
    pub fn new(screen: Arc<dyn CaptureBackend>) -> Self {
        Self { screen }
    }
}

#[async_trait]
impl CaptureBackend for NativeBackend {
    async fn acquire_screen(&self, include_system_audio: bool) -> RecordingResult<CaptureSource> {
        self.screen.acquire_screen(include_system_audio).await
    }

    async fn acquire_camera(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource> {
        #[cfg(feature = "camera-nokhwa")]
        {
            camera::open_camera(device_id.map(str::to_string)).await
        }

        #[cfg(not(feature = "camera-nokhwa"))]
        {
            self.screen.acquire_camera(device_id).await
        }
    }

    async fn acquire_microphone(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource> {
        #[cfg(feature = "microphone-cpal")]
        {
            microphone::open_microphone(device_id.map(str::to_string)).await
        }

        #[cfg(not(feature = "microphone-cpal"))]
        {
            self.screen.acquire_microphone(device_id).await
        }
    }

    fn list_displays(&self) -> Vec<DisplayInfo> {
        self.screen.list_displays()
    }

    fn list_audio_inputs(&self) -> Vec<AudioDeviceInfo> {
        #[cfg(feature = "microphone-cpal")]
        {
            microphone::get_audio_input_devices()
        }

        #[cfg(not(feature = "microphone-cpal"))]
        {
            self.screen.list_audio_inputs()
        }
    }

    fn list_cameras(&self) -> Vec<CameraInfo> {
        #[cfg(feature = "camera-nokhwa")]
        {
            camera::get_cameras()
        }

        #[cfg(not(feature = "camera-nokhwa"))]
        {
            self.screen.list_cameras()
        }
    }
}
