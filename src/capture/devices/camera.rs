//! Webcam capture using nokhwa
//!
//! Frames are decoded to RGBA on a capture thread and published to a video
//! track until the track is released.

use crate::capture::source::{CaptureSource, MediaTrack, SourceKind, VideoFrame};
use crate::capture::traits::{CameraInfo, Resolution};
use crate::utils::error::{RecordingError, RecordingResult};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tokio::sync::oneshot;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                // Common resolutions
                let supported_resolutions = [(1920, 1080), (1280, 720), (640, 480)]
                    .into_iter()
                    .map(|(width, height)| Resolution { width, height })
                    .collect();

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions,
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Get camera index from device_id
fn camera_index(device_id: Option<&str>) -> CameraIndex {
    match device_id {
        Some(id) => match id.parse::<u32>() {
            Ok(idx) => CameraIndex::Index(idx),
            Err(_) => CameraIndex::String(id.to_string()),
        },
        None => CameraIndex::Index(0),
    }
}

/// Open a camera and stream its frames into a new video track
pub async fn open_camera(device_id: Option<String>) -> RecordingResult<CaptureSource> {
    if get_cameras().is_empty() {
        return Err(RecordingError::DeviceNotFound("No cameras found".to_string()));
    }

    let index = camera_index(device_id.as_deref());
    let label = device_id.unwrap_or_else(|| "Camera".to_string());
    let track = MediaTrack::video(label.clone(), 0, 0);
    let producer = track.clone();
    let (ready_tx, ready_rx) = oneshot::channel::<RecordingResult<()>>();

    std::thread::spawn(move || {
        let format =
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = match Camera::new(index.clone(), format) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready_tx.send(Err(RecordingError::DeviceDenied(format!(
                    "failed to open camera {index:?}: {e}"
                ))));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            let _ = ready_tx.send(Err(RecordingError::DeviceInUse(format!(
                "failed to open camera stream: {e}"
            ))));
            return;
        }

        let resolution = camera.camera_format().resolution();
        tracing::info!(
            "Webcam opened: {}x{} @ {}fps",
            resolution.width(),
            resolution.height(),
            camera.camera_format().frame_rate()
        );

        if ready_tx.send(Ok(())).is_err() {
            let _ = camera.stop_stream();
            return;
        }

        let mut frame_count: u64 = 0;
        while producer.is_live() {
            // Blocks until the camera delivers the next frame
            match camera.frame() {
                Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let (width, height) = (image.width(), image.height());
                        if let Some(frame) = VideoFrame::from_rgba(width, height, image.into_raw()) {
                            producer.push_frame(frame);
                            frame_count += 1;
                        }
                    }
                    Err(e) => tracing::debug!("Failed to decode webcam frame: {:?}", e),
                },
                Err(e) => tracing::debug!("Failed to capture frame: {:?}", e),
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {:?}", e);
        }
        tracing::info!("Webcam capture thread stopped after {} frames", frame_count);
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok(CaptureSource::new(SourceKind::Camera, label, vec![track])),
        Ok(Err(e)) => {
            track.stop();
            Err(e)
        }
        Err(_) => {
            track.stop();
            Err(RecordingError::DeviceInUse(
                "camera thread exited before opening".to_string(),
            ))
        }
    }
}
