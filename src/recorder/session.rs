//! Recording session aggregate
//!
//! Owns every resource of one session so a single routine can release them all.

use super::chunks::ChunkBuffer;
use super::encoder::Encoder;
use crate::capture::source::CaptureSource;
use crate::compositor::Compositor;
use crate::mixer::AudioMixer;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Resources acquired for one recording
pub struct RecordingSession {
    pub id: Uuid,
    pub screen: Option<CaptureSource>,
    pub camera: Option<CaptureSource>,
    pub microphone: Option<CaptureSource>,
    pub mixer: Option<AudioMixer>,
    pub compositor: Option<Compositor>,
    pub encoder: Option<Box<dyn Encoder>>,
    pub chunks: ChunkBuffer,
    pub started_at: Option<DateTime<Utc>>,
    /// Monotonic start, fixed once the encoder starts
    pub started: Option<Instant>,
    /// Displayed duration; only advances while recording
    pub displayed_seconds: u64,
    tasks: Vec<JoinHandle<()>>,
    torn_down: bool,
}

impl RecordingSession {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            screen: None,
            camera: None,
            microphone: None,
            mixer: None,
            compositor: None,
            encoder: None,
            chunks: ChunkBuffer::new(),
            started_at: None,
            started: None,
            displayed_seconds: 0,
            tasks: Vec::new(),
            torn_down: false,
        }
    }

    /// Attach a background task that lives as long as the session
    pub fn add_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Whole seconds since the encoder started
    pub fn elapsed_seconds(&self) -> u64 {
        self.started.map(|s| s.elapsed().as_secs()).unwrap_or(0)
    }

    /// Whether any source of this session still produces media
    pub fn has_live_sources(&self) -> bool {
        [&self.screen, &self.camera, &self.microphone]
            .into_iter()
            .flatten()
            .any(CaptureSource::is_live)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Release everything the session owns. Safe from any state, any number of times.
    pub fn teardown(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.abort();
        }
        if let Some(mut compositor) = self.compositor.take() {
            compositor.cleanup();
        }
        if let Some(mut mixer) = self.mixer.take() {
            mixer.cleanup();
        }
        for source in [&mut self.camera, &mut self.microphone, &mut self.screen] {
            if let Some(mut source) = source.take() {
                source.release();
            }
        }
        self.chunks.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if !self.torn_down {
            self.torn_down = true;
            tracing::debug!("Session {} torn down", self.id);
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::{MediaTrack, SourceKind};

    #[test]
    fn test_teardown_releases_every_source() {
        let screen = MediaTrack::video("screen", 8, 8);
        let mic = MediaTrack::audio("mic", 48_000, 1);
        let mut session = RecordingSession::new(Uuid::new_v4());
        session.screen = Some(CaptureSource::new(SourceKind::Screen, "screen", vec![screen.clone()]));
        session.microphone = Some(CaptureSource::new(SourceKind::Microphone, "mic", vec![mic.clone()]));
        session.chunks.push(vec![1, 2, 3]);
        assert!(session.has_live_sources());

        session.teardown();
        session.teardown();

        assert!(session.is_torn_down());
        assert!(!screen.is_live());
        assert!(!mic.is_live());
        assert!(session.chunks.is_empty());
        assert!(!session.has_live_sources());
    }

    #[test]
    fn test_elapsed_is_zero_before_start() {
        let session = RecordingSession::new(Uuid::new_v4());
        assert_eq!(session.elapsed_seconds(), 0);
    }
}
