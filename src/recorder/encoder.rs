//! Stream encoder
//!
//! Records one video and one audio track into the chunked container, emitting
//! a chunk every `timeslice` and a single `Stopped` event once the final chunk
//! has been delivered. Video packets are PNG-compressed and only written when
//! the picture changes.

use super::container::{self, TrackEntry};
use crate::capture::source::{MediaTrack, VideoFrame};
use crate::config::RecorderConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const VIDEO_TRACK: u8 = 0;
const AUDIO_TRACK: u8 = 1;

/// Encoder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// Events delivered to the session driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// An encoded slice, in order
    Chunk(Vec<u8>),
    /// Final chunk delivered; fires once per successful stop
    Stopped,
    /// Encoding failed; no `Stopped` follows
    Error(String),
}

/// The combined stream handed to the encoder: composited video plus mixed audio
#[derive(Debug, Clone)]
pub struct EncodableStream {
    pub video: MediaTrack,
    pub audio: MediaTrack,
}

/// A running media encoder
pub trait Encoder: Send {
    /// Begin encoding, slicing output every `timeslice`
    fn start(&mut self, timeslice: Duration) -> RecordingResult<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Request a stop. Completion is signalled by [`EncoderEvent::Stopped`].
    fn stop(&mut self);

    /// Stop immediately, discarding anything not yet delivered. No event fires.
    fn abort(&mut self);

    fn state(&self) -> EncoderState;

    /// Negotiated media type of the produced chunks
    fn mime_type(&self) -> &str;
}

/// Creates encoders for a session
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        stream: EncodableStream,
        config: &RecorderConfig,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> RecordingResult<Box<dyn Encoder>>;
}

/// Factory for [`StreamEncoder`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamEncoderFactory;

impl EncoderFactory for StreamEncoderFactory {
    fn create(
        &self,
        stream: EncodableStream,
        config: &RecorderConfig,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> RecordingResult<Box<dyn Encoder>> {
        Ok(Box::new(StreamEncoder::new(stream, config, events)?))
    }
}

enum Command {
    Pause,
    Resume,
    Stop,
}

/// Samples the input tracks at the configured frame rate and muxes them
pub struct StreamEncoder {
    stream: EncodableStream,
    mime_type: String,
    frame_interval: Duration,
    state: EncoderState,
    events: Option<mpsc::UnboundedSender<EncoderEvent>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl StreamEncoder {
    pub fn new(
        stream: EncodableStream,
        config: &RecorderConfig,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> RecordingResult<Self> {
        for track in [&stream.video, &stream.audio] {
            if !track.is_live() {
                return Err(RecordingError::EncoderFailure(format!(
                    "input track '{}' is not live",
                    track.label()
                )));
            }
        }
        Ok(Self {
            stream,
            mime_type: config.mime_type.clone(),
            frame_interval: config.frame_interval(),
            state: EncoderState::Inactive,
            events: Some(events),
            commands: None,
            task: None,
        })
    }

    fn track_table(&self) -> Vec<TrackEntry> {
        let video = self.stream.video.settings();
        let audio = self.stream.audio.settings();
        vec![
            TrackEntry::Video {
                width: video.width.unwrap_or(0),
                height: video.height.unwrap_or(0),
            },
            TrackEntry::Audio {
                sample_rate: audio.sample_rate.unwrap_or(0),
                channels: audio.channels.unwrap_or(0) as u32,
            },
        ]
    }

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(command);
        }
    }
}

impl Encoder for StreamEncoder {
    fn start(&mut self, timeslice: Duration) -> RecordingResult<()> {
        let events = self.events.take().ok_or_else(|| {
            RecordingError::EncoderFailure("encoder has already been started".to_string())
        })?;
        if timeslice.is_zero() {
            return Err(RecordingError::EncoderFailure("timeslice must be positive".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RecordingError::EncoderFailure("no async runtime to drive the encoder".to_string())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let muxer = Muxer {
            video: self.stream.video.clone(),
            audio: self.stream.audio.clone(),
            channels: self.stream.audio.settings().channels.unwrap_or(1).max(1) as usize,
            pending: container::write_header(&self.track_table()),
            origin: Instant::now(),
            last_frame: None,
            paused_at: None,
            paused_total: Duration::ZERO,
        };
        self.task = Some(runtime.spawn(muxer.run(self.frame_interval, timeslice, events, rx)));
        self.commands = Some(tx);
        self.state = EncoderState::Recording;

        tracing::info!(
            "Encoder started ({}, {:?} slices)",
            self.mime_type,
            timeslice
        );
        Ok(())
    }

    fn pause(&mut self) {
        if self.state == EncoderState::Recording {
            self.send(Command::Pause);
            self.state = EncoderState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == EncoderState::Paused {
            self.send(Command::Resume);
            self.state = EncoderState::Recording;
        }
    }

    fn stop(&mut self) {
        if self.state != EncoderState::Inactive {
            self.send(Command::Stop);
            self.state = EncoderState::Inactive;
        }
    }

    fn abort(&mut self) {
        self.commands = None;
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Encoder aborted");
        }
        self.state = EncoderState::Inactive;
    }

    fn state(&self) -> EncoderState {
        self.state
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for StreamEncoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// State owned by the encoder task
struct Muxer {
    video: MediaTrack,
    audio: MediaTrack,
    channels: usize,
    pending: Vec<u8>,
    /// Last frame written; a video packet holds until the next one
    last_frame: Option<VideoFrame>,
    origin: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Muxer {
    async fn run(
        mut self,
        frame_interval: Duration,
        timeslice: Duration,
        events: mpsc::UnboundedSender<EncoderEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut frames = tokio::time::interval(frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut slices = tokio::time::interval_at(Instant::now() + timeslice, timeslice);

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    if !self.video.is_live() {
                        let _ = events.send(EncoderEvent::Error(format!(
                            "video input '{}' ended",
                            self.video.label()
                        )));
                        return;
                    }
                    if let Err(e) = self.sample() {
                        let _ = events.send(EncoderEvent::Error(e.to_string()));
                        return;
                    }
                }
                _ = slices.tick() => self.flush(&events),
                command = commands.recv() => match command {
                    Some(Command::Pause) => {
                        self.paused_at.get_or_insert_with(Instant::now);
                    }
                    Some(Command::Resume) => {
                        if let Some(at) = self.paused_at.take() {
                            self.paused_total += at.elapsed();
                        }
                    }
                    Some(Command::Stop) => {
                        if self.paused_at.is_none() {
                            if let Err(e) = self.sample() {
                                let _ = events.send(EncoderEvent::Error(e.to_string()));
                                return;
                            }
                        }
                        self.flush(&events);
                        let _ = events.send(EncoderEvent::Stopped);
                        tracing::debug!("Encoder stopped");
                        return;
                    }
                    // Encoder handle dropped without stopping
                    None => return,
                },
            }
        }
    }

    /// Media time: wall time since start minus time spent paused
    fn timestamp_ms(&self) -> u64 {
        self.origin.elapsed().saturating_sub(self.paused_total).as_millis() as u64
    }

    fn sample(&mut self) -> RecordingResult<()> {
        let buffered = self.audio.buffered_samples();
        let whole = buffered - buffered % self.channels;

        if self.paused_at.is_some() {
            // Audio produced while paused is not recorded
            self.audio.pull_samples(whole);
            return Ok(());
        }

        let ts = self.timestamp_ms();
        if let Some(frame) = self.video.latest_frame() {
            if self.last_frame.as_ref() != Some(&frame) {
                let payload = frame.encode_png()?;
                container::write_packet(&mut self.pending, VIDEO_TRACK, ts, &payload);
                self.last_frame = Some(frame);
            }
        }
        if whole > 0 {
            let payload: Vec<u8> = self
                .audio
                .pull_samples(whole)
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect();
            container::write_packet(&mut self.pending, AUDIO_TRACK, ts, &payload);
        }
        Ok(())
    }

    fn flush(&mut self, events: &mpsc::UnboundedSender<EncoderEvent>) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.pending);
        tracing::debug!("Encoder emitted {} byte chunk", chunk.len());
        let _ = events.send(EncoderEvent::Chunk(chunk));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::VideoFrame;
    use crate::recorder::chunks::ChunkBuffer;

    fn stream() -> EncodableStream {
        let video = MediaTrack::video("Composited Output", 8, 4);
        video.push_frame(VideoFrame::solid(8, 4, [1, 2, 3, 255]));
        EncodableStream {
            video,
            audio: MediaTrack::audio("Mixed Audio", 48_000, 2),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EncoderEvent>) -> Vec<EncoderEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_chunk_per_timeslice_then_stopped_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = RecorderConfig::default();
        let mut encoder = StreamEncoder::new(stream(), &config, tx).unwrap();

        encoder.start(Duration::from_secs(1)).unwrap();
        assert_eq!(encoder.state(), EncoderState::Recording);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        encoder.stop();
        encoder.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = drain(&mut rx);
        let chunks = events
            .iter()
            .filter(|e| matches!(e, EncoderEvent::Chunk(_)))
            .count();
        assert_eq!(chunks, 3);
        assert_eq!(events.last(), Some(&EncoderEvent::Stopped));
        assert_eq!(
            events.iter().filter(|e| **e == EncoderEvent::Stopped).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_parses_with_one_track_per_kind() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = stream();
        let audio = input.audio.clone();
        let mut encoder = StreamEncoder::new(input, &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_millis(500)).unwrap();

        for _ in 0..10 {
            audio.push_samples(&[0.1; 960]);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        encoder.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buffer = ChunkBuffer::new();
        for event in drain(&mut rx) {
            if let EncoderEvent::Chunk(chunk) = event {
                buffer.push(chunk);
            }
        }
        let info = buffer.assemble("video/x-oss-live").probe().unwrap();
        assert_eq!(info.video_tracks(), 1);
        assert_eq!(info.audio_tracks(), 1);
        assert!(info.packets[0] > 0);
        assert!(info.packets[1] > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_frames_are_written_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = stream();
        let video = input.video.clone();
        let mut encoder = StreamEncoder::new(input, &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        video.push_frame(VideoFrame::solid(8, 4, [9, 9, 9, 255]));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        encoder.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buffer = ChunkBuffer::new();
        for event in drain(&mut rx) {
            if let EncoderEvent::Chunk(chunk) = event {
                buffer.push(chunk);
            }
        }
        let info = buffer.assemble("video/x-oss-live").probe().unwrap();
        assert_eq!(info.packets[0], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_hd_output_stays_compact() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let video = MediaTrack::video("Composited Output", 1920, 1080);
        let audio = MediaTrack::audio("Mixed Audio", 48_000, 2);
        video.push_frame(VideoFrame::solid(1920, 1080, [20, 40, 200, 255]));
        let input = EncodableStream {
            video: video.clone(),
            audio: audio.clone(),
        };
        let mut encoder = StreamEncoder::new(input, &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();

        for shade in 0..4u8 {
            audio.push_samples(&[0.25; 48_000]);
            video.push_frame(VideoFrame::solid(1920, 1080, [20 + shade, 40, 200, 255]));
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        encoder.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let bytes: usize = drain(&mut rx)
            .into_iter()
            .map(|event| match event {
                EncoderEvent::Chunk(chunk) => chunk.len(),
                _ => 0,
            })
            .sum();
        let per_second = bytes / 2;
        // One raw 1080p frame alone is 8 MB
        assert!(per_second < 1_000_000, "{per_second} bytes per second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_excludes_media_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut encoder = StreamEncoder::new(stream(), &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        encoder.pause();
        assert_eq!(encoder.state(), EncoderState::Paused);
        tokio::time::sleep(Duration::from_secs(5)).await;
        encoder.resume();
        tokio::time::sleep(Duration::from_secs(1)).await;
        encoder.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buffer = ChunkBuffer::new();
        for event in drain(&mut rx) {
            if let EncoderEvent::Chunk(chunk) = event {
                buffer.push(chunk);
            }
        }
        let info = buffer.assemble("video/x-oss-live").probe().unwrap();
        assert!(info.last_timestamp_ms <= 2100, "{}", info.last_timestamp_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_fires_no_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut encoder = StreamEncoder::new(stream(), &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();

        encoder.abort();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(encoder.state(), EncoderState::Inactive);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_video_input_is_an_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = stream();
        let video = input.video.clone();
        let mut encoder = StreamEncoder::new(input, &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();

        video.end();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(drain(&mut rx).last(), Some(EncoderEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_rejects_stopped_input() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let input = stream();
        input.audio.stop();

        assert!(matches!(
            StreamEncoder::new(input, &RecorderConfig::default(), tx),
            Err(RecordingError::EncoderFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut encoder = StreamEncoder::new(stream(), &RecorderConfig::default(), tx).unwrap();
        encoder.start(Duration::from_secs(1)).unwrap();
        assert!(encoder.start(Duration::from_secs(1)).is_err());
    }
}
