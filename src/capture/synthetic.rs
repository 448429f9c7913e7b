//! Synthetic capture backend
//!
//! An in-process [`CaptureBackend`] whose devices are solid-color frames and
//! generated tones. Each acquisition outcome is scriptable, and every track
//! handed out is remembered so callers can verify that nothing leaked.

use super::source::{CaptureSource, MediaTrack, SourceKind, TrackKind, VideoFrame};
use super::traits::{AudioDeviceInfo, CameraInfo, CaptureBackend, DisplayInfo, Resolution};
use crate::utils::error::{RecordingError, RecordingResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Scripted result for the screen picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOutcome {
    /// Grant a screen; system audio is attached only when requested and `with_audio` is set
    Grant { with_audio: bool },
    /// The user dismissed the picker
    Cancel,
    /// Screen capture permission was refused
    Deny,
    /// Grant a source that carries no video track
    NoVideo,
}

/// Scripted result for camera and microphone requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    Grant,
    Deny,
    NotFound,
    InUse,
}

impl DeviceOutcome {
    fn into_result(self, device: &str) -> RecordingResult<()> {
        match self {
            DeviceOutcome::Grant => Ok(()),
            DeviceOutcome::Deny => Err(RecordingError::DeviceDenied(format!(
                "{device} permission denied"
            ))),
            DeviceOutcome::NotFound => Err(RecordingError::DeviceNotFound(format!(
                "no {device} available"
            ))),
            DeviceOutcome::InUse => Err(RecordingError::DeviceInUse(format!(
                "{device} is used by another application"
            ))),
        }
    }
}

/// Settings for the synthetic devices
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub screen: ScreenOutcome,
    pub camera: DeviceOutcome,
    pub microphone: DeviceOutcome,
    pub screen_size: Resolution,
    pub camera_size: Resolution,
    pub screen_color: [u8; 4],
    pub camera_color: [u8; 4],
    pub sample_rate: u32,
    pub channels: u16,
    /// Publish a first frame as soon as a video source is granted
    pub emit_first_frame: bool,
    /// Simulated time a permission prompt stays open
    pub prompt_delay: Option<Duration>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            screen: ScreenOutcome::Grant { with_audio: true },
            camera: DeviceOutcome::Grant,
            microphone: DeviceOutcome::Grant,
            screen_size: Resolution {
                width: 64,
                height: 36,
            },
            camera_size: Resolution {
                width: 32,
                height: 24,
            },
            screen_color: [20, 40, 200, 255],
            camera_color: [230, 60, 30, 255],
            sample_rate: 48_000,
            channels: 2,
            emit_first_frame: true,
            prompt_delay: None,
        }
    }
}

/// A source handed out by the backend, as seen from outside the session
#[derive(Debug, Clone)]
pub struct IssuedSource {
    pub kind: SourceKind,
    pub tracks: Vec<MediaTrack>,
}

impl IssuedSource {
    /// True while any of the source's tracks is still live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }
}

/// Scriptable in-process backend
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    config: Mutex<SyntheticConfig>,
    issued: Mutex<Vec<IssuedSource>>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: Mutex::new(config),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Change the scripted behaviour between acquisitions
    pub fn configure(&self, update: impl FnOnce(&mut SyntheticConfig)) {
        update(&mut self.config.lock());
    }

    /// Every source acquired so far, in acquisition order
    pub fn issued(&self) -> Vec<IssuedSource> {
        self.issued.lock().clone()
    }

    /// Most recent source of the given kind
    pub fn last_issued(&self, kind: SourceKind) -> Option<IssuedSource> {
        self.issued
            .lock()
            .iter()
            .rev()
            .find(|source| source.kind == kind)
            .cloned()
    }

    /// Number of issued sources that still hold a live track
    pub fn live_sources(&self) -> usize {
        self.issued.lock().iter().filter(|s| s.is_live()).count()
    }

    /// Simulate the OS-level "stop sharing" control on the latest screen
    pub fn end_screen_share(&self) -> bool {
        self.last_issued(SourceKind::Screen)
            .map(|source| {
                source
                    .tracks
                    .iter()
                    .filter(|t| t.kind() == TrackKind::Video)
                    .fold(false, |ended, t| t.end() || ended)
            })
            .unwrap_or(false)
    }

    /// Push one frame to every live video track and one block of tone to every
    /// live audio track. `tick` varies the frame brightness.
    pub fn pump(&self, tick: u64, block: Duration) {
        let config = self.config.lock().clone();
        let shade = (tick % 64) as u8;
        for source in self.issued.lock().iter() {
            for track in source.tracks.iter().filter(|t| t.is_live()) {
                match track.kind() {
                    TrackKind::Video => {
                        let (size, base) = match source.kind {
                            SourceKind::Camera => (config.camera_size, config.camera_color),
                            _ => (config.screen_size, config.screen_color),
                        };
                        let color = [
                            base[0].saturating_add(shade),
                            base[1],
                            base[2],
                            base[3],
                        ];
                        track.push_frame(VideoFrame::solid(size.width, size.height, color));
                    }
                    TrackKind::Audio => {
                        let settings = track.settings();
                        let rate = settings.sample_rate.unwrap_or(config.sample_rate);
                        let channels = settings.channels.unwrap_or(config.channels) as usize;
                        let frames = (rate as u128 * block.as_millis() / 1000) as usize;
                        let samples = tone(frames, channels, rate, tick);
                        track.push_samples(&samples);
                    }
                }
            }
        }
    }

    async fn prompt(&self) {
        let delay = self.config.lock().prompt_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn issue(&self, kind: SourceKind, label: &str, tracks: Vec<MediaTrack>) -> CaptureSource {
        self.issued.lock().push(IssuedSource {
            kind,
            tracks: tracks.clone(),
        });
        tracing::debug!("Synthetic backend issued {} source with {} tracks", kind, tracks.len());
        CaptureSource::new(kind, label, tracks)
    }

    fn video_track(label: &str, size: Resolution, color: [u8; 4], emit: bool) -> MediaTrack {
        let track = MediaTrack::video(label, size.width, size.height);
        if emit {
            track.push_frame(VideoFrame::solid(size.width, size.height, color));
        }
        track
    }
}

/// 440 Hz sine block at a low level
fn tone(frames: usize, channels: usize, rate: u32, tick: u64) -> Vec<f32> {
    let offset = tick as usize * frames;
    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        let t = (offset + i) as f32 / rate.max(1) as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.2;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

#[async_trait]
impl CaptureBackend for SyntheticBackend {
    async fn acquire_screen(&self, include_system_audio: bool) -> RecordingResult<CaptureSource> {
        self.prompt().await;
        let config = self.config.lock().clone();

        let mut tracks = Vec::new();
        match config.screen {
            ScreenOutcome::Cancel => return Err(RecordingError::UserCancelled),
            ScreenOutcome::Deny => {
                return Err(RecordingError::DeviceDenied(
                    "screen capture permission denied".to_string(),
                ))
            }
            ScreenOutcome::Grant { .. } => tracks.push(Self::video_track(
                "Synthetic Display",
                config.screen_size,
                config.screen_color,
                config.emit_first_frame,
            )),
            ScreenOutcome::NoVideo => {}
        }

        let grants_audio = match config.screen {
            ScreenOutcome::Grant { with_audio } => with_audio,
            _ => true,
        };
        if include_system_audio && grants_audio {
            tracks.push(MediaTrack::audio(
                "Synthetic System Audio",
                config.sample_rate,
                config.channels,
            ));
        }

        Ok(self.issue(SourceKind::Screen, "Synthetic Display", tracks))
    }

    async fn acquire_camera(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource> {
        self.prompt().await;
        let config = self.config.lock().clone();
        config.camera.into_result("camera")?;

        let label = device_id.unwrap_or("Synthetic Camera");
        let track = Self::video_track(
            label,
            config.camera_size,
            config.camera_color,
            config.emit_first_frame,
        );
        Ok(self.issue(SourceKind::Camera, label, vec![track]))
    }

    async fn acquire_microphone(&self, device_id: Option<&str>) -> RecordingResult<CaptureSource> {
        self.prompt().await;
        let config = self.config.lock().clone();
        config.microphone.into_result("microphone")?;

        let label = device_id.unwrap_or("Synthetic Microphone");
        let track = MediaTrack::audio(label, config.sample_rate, 1);
        Ok(self.issue(SourceKind::Microphone, label, vec![track]))
    }

    fn list_displays(&self) -> Vec<DisplayInfo> {
        let size = self.config.lock().screen_size;
        vec![DisplayInfo {
            id: 1,
            name: "Synthetic Display".to_string(),
            width: size.width,
            height: size.height,
            scale_factor: 1.0,
            is_primary: true,
            refresh_rate: Some(60),
        }]
    }

    fn list_audio_inputs(&self) -> Vec<AudioDeviceInfo> {
        vec![AudioDeviceInfo {
            id: "synthetic-mic".to_string(),
            name: "Synthetic Microphone".to_string(),
            is_input: true,
            is_default: true,
        }]
    }

    fn list_cameras(&self) -> Vec<CameraInfo> {
        let size = self.config.lock().camera_size;
        vec![CameraInfo {
            id: "synthetic-camera".to_string(),
            name: "Synthetic Camera".to_string(),
            supported_resolutions: vec![size],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_screen_without_audio_when_picker_refuses() {
        let backend = SyntheticBackend::new(SyntheticConfig {
            screen: ScreenOutcome::Grant { with_audio: false },
            ..SyntheticConfig::default()
        });

        let screen = backend.acquire_screen(true).await.unwrap();
        assert!(screen.video_track().is_some());
        assert!(!screen.has_audio());
    }

    #[tokio::test]
    async fn test_cancelled_picker() {
        let backend = SyntheticBackend::new(SyntheticConfig {
            screen: ScreenOutcome::Cancel,
            ..SyntheticConfig::default()
        });

        let result = backend.acquire_screen(false).await;
        assert!(matches!(result, Err(RecordingError::UserCancelled)));
        assert!(backend.issued().is_empty());
    }

    #[tokio::test]
    async fn test_device_failures_map_to_taxonomy() {
        let backend = SyntheticBackend::default();
        backend.configure(|c| {
            c.camera = DeviceOutcome::InUse;
            c.microphone = DeviceOutcome::NotFound;
        });

        assert!(matches!(
            backend.acquire_camera(None).await,
            Err(RecordingError::DeviceInUse(_))
        ));
        assert!(matches!(
            backend.acquire_microphone(None).await,
            Err(RecordingError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dropping_sources_leaves_nothing_live() {
        let backend = SyntheticBackend::default();
        {
            let _screen = backend.acquire_screen(true).await.unwrap();
            let _camera = backend.acquire_camera(None).await.unwrap();
            assert_eq!(backend.live_sources(), 2);
        }
        assert_eq!(backend.live_sources(), 0);
    }

    #[tokio::test]
    async fn test_pump_feeds_live_tracks() {
        let backend = SyntheticBackend::default();
        let screen = backend.acquire_screen(true).await.unwrap();
        let audio = screen.audio_tracks().next().unwrap().clone();

        backend.pump(1, Duration::from_millis(10));

        // 10ms of stereo at 48kHz
        assert_eq!(audio.buffered_samples(), 480 * 2);
        assert!(screen.video_track().unwrap().latest_frame().is_some());
    }

    #[test]
    fn test_device_lists_follow_config() {
        let backend = SyntheticBackend::default();
        backend.configure(|c| c.screen_size = Resolution { width: 128, height: 72 });

        let displays = backend.list_displays();
        assert_eq!(displays.len(), 1);
        assert_eq!((displays[0].width, displays[0].height), (128, 72));
        assert!(backend.list_audio_inputs()[0].is_default);
        assert_eq!(backend.list_cameras()[0].supported_resolutions[0].width, 32);
    }

    #[tokio::test]
    async fn test_end_screen_share() {
        let backend = SyntheticBackend::default();
        let screen = backend.acquire_screen(false).await.unwrap();

        assert!(backend.end_screen_share());
        assert!(!screen.video_track().unwrap().is_live());
    }
}
