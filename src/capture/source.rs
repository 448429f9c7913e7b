//! Live capture sources and their tracks
//!
//! A [`CaptureSource`] is what an acquirer hands back: an owned bundle of
//! [`MediaTrack`]s. Tracks are cheap shared handles so the compositor, the
//! mixer and preview readers can observe them, but only the owner of the
//! source can stop them.

use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Seconds of interleaved audio an audio track buffers before dropping old samples
const MAX_BUFFERED_SECONDS: usize = 2;

/// What a capture source was acquired from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Screen,
    Camera,
    Microphone,
    SystemAudio,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Screen => write!(f, "screen"),
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Microphone => write!(f, "microphone"),
            SourceKind::SystemAudio => write!(f, "system-audio"),
        }
    }
}

/// Media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Producing media
    Live,
    /// Released by its owner
    Stopped,
    /// Ended by the producer (device unplugged, "stop sharing" pressed)
    Ended,
}

/// Format reported by a track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// One decoded RGBA frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<Vec<u8>>,
}

impl VideoFrame {
    /// Wrap RGBA pixel data. Returns `None` if the buffer does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::new(data),
        })
    }

    /// A frame filled with a single color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`; `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Save the frame as an 8-bit RGBA PNG
    pub fn write_png(&self, path: &Path) -> RecordingResult<()> {
        let file = File::create(path)?;
        self.encode_png_into(BufWriter::new(file), png::Compression::Default)
    }

    /// The frame as PNG bytes, favouring speed over size
    pub fn encode_png(&self) -> RecordingResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_png_into(&mut out, png::Compression::Fast)?;
        Ok(out)
    }

    fn encode_png_into<W: Write>(&self, out: W, compression: png::Compression) -> RecordingResult<()> {
        let mut encoder = png::Encoder::new(out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(compression);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RecordingError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        writer
            .write_image_data(&self.data)
            .map_err(|e| RecordingError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        writer
            .finish()
            .map_err(|e| RecordingError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(())
    }
}

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    settings: Mutex<TrackSettings>,
    state: watch::Sender<TrackState>,
    frame: watch::Sender<Option<VideoFrame>>,
    samples: Mutex<VecDeque<f32>>,
}

/// Shared handle to a live device track
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

impl MediaTrack {
    fn new(kind: TrackKind, label: impl Into<String>, settings: TrackSettings) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        let (frame, _) = watch::channel(None);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label: label.into(),
                settings: Mutex::new(settings),
                state,
                frame,
                samples: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Create a live video track. Dimensions of zero mean "not known yet".
    pub fn video(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self::new(
            TrackKind::Video,
            label,
            TrackSettings {
                width: (width > 0).then_some(width),
                height: (height > 0).then_some(height),
                ..TrackSettings::default()
            },
        )
    }

    /// Create a live audio track carrying interleaved f32 samples
    pub fn audio(label: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self::new(
            TrackKind::Audio,
            label,
            TrackSettings {
                sample_rate: Some(sample_rate),
                channels: Some(channels),
                ..TrackSettings::default()
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> TrackSettings {
        *self.inner.settings.lock()
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Whether two handles refer to the same track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Release the track. Returns `true` if this call stopped it.
    pub(crate) fn stop(&self) -> bool {
        let stopped = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Stopped;
                true
            } else {
                false
            }
        });
        if stopped {
            self.inner.samples.lock().clear();
            self.inner.frame.send_replace(None);
        }
        stopped
    }

    /// Producer-side end of the track, e.g. the OS "stop sharing" control
    pub fn end(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the track leaves the live state and report how it finished
    pub async fn ended(&self) -> TrackState {
        let mut rx = self.inner.state.subscribe();
        let result = match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state,
            Err(_) => TrackState::Ended,
        };
        result
    }

    /// Publish a decoded frame. Ignored once the track is no longer live.
    pub fn push_frame(&self, frame: VideoFrame) {
        if self.inner.kind != TrackKind::Video || !self.is_live() {
            return;
        }
        {
            let mut settings = self.inner.settings.lock();
            settings.width.get_or_insert(frame.width);
            settings.height.get_or_insert(frame.height);
        }
        self.inner.frame.send_replace(Some(frame));
    }

    /// Most recent frame, if the track is live and has produced one
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }
        self.inner.frame.borrow().clone()
    }

    /// Wait for the first decodable frame. Resolves to `None` if the track
    /// stops or ends before producing one.
    pub async fn first_frame(&self) -> Option<VideoFrame> {
        let mut rx = self.inner.frame.subscribe();
        tokio::select! {
            frame = rx.wait_for(|frame| frame.is_some()) => match frame {
                Ok(frame) => frame.clone(),
                Err(_) => None,
            },
            _ = self.ended() => None,
        }
    }

    /// Append interleaved samples. Oldest samples are dropped past the buffer limit.
    pub fn push_samples(&self, samples: &[f32]) {
        if self.inner.kind != TrackKind::Audio || !self.is_live() {
            return;
        }
        let settings = self.settings();
        let limit = settings.sample_rate.unwrap_or(48_000) as usize
            * settings.channels.unwrap_or(2) as usize
            * MAX_BUFFERED_SECONDS;

        let mut queue = self.inner.samples.lock();
        queue.extend(samples.iter().copied());
        if queue.len() > limit {
            let excess = queue.len() - limit;
            queue.drain(..excess);
        }
    }

    /// Take exactly `count` samples, padding with silence when fewer are buffered
    pub fn pull_samples(&self, count: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(count);
        if self.is_live() {
            let mut queue = self.inner.samples.lock();
            let available = queue.len().min(count);
            out.extend(queue.drain(..available));
        }
        out.resize(count, 0.0);
        out
    }

    /// Samples currently waiting in the queue
    pub fn buffered_samples(&self) -> usize {
        self.inner.samples.lock().len()
    }
}

/// An owned live source: one device or display and the tracks it produced
pub struct CaptureSource {
    id: Uuid,
    kind: SourceKind,
    label: String,
    tracks: Vec<MediaTrack>,
    released: bool,
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("tracks", &self.tracks)
            .field("released", &self.released)
            .finish()
    }
}

impl CaptureSource {
    pub fn new(kind: SourceKind, label: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            tracks,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// First video track, if any
    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    /// Whether an audio track was actually granted (never trust the request flag)
    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    /// True while the source is unreleased and at least one track still produces media
    pub fn is_live(&self) -> bool {
        !self.released && self.tracks.iter().any(MediaTrack::is_live)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop every track. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let stopped = self.tracks.iter().filter(|t| t.stop()).count();
        tracing::debug!(
            "Released {} source '{}' ({} of {} tracks stopped)",
            self.kind,
            self.label,
            stopped,
            self.tracks.len()
        );
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.release();
    }
}
