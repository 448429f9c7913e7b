//! Audio mixer
//!
//! Sums up to two live audio inputs (microphone, system audio) into one
//! output track. A pump task renders one quantum per tick, so the output
//! keeps flowing even when every input is missing.

pub mod graph;

pub use graph::{AudioGraph, GainNode};

use crate::capture::source::MediaTrack;
use crate::config::RecorderConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Mixes 0..n audio tracks into a single track
pub struct AudioMixer {
    graph: Arc<Mutex<AudioGraph>>,
    output: MediaTrack,
    frames_per_quantum: usize,
    task: Option<JoinHandle<()>>,
}

impl AudioMixer {
    /// Build the graph and start pumping. Synchronous; fails only when the audio
    /// context cannot be created.
    pub fn new(inputs: &[MediaTrack], config: &RecorderConfig) -> RecordingResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RecordingError::AudioGraphFailed("no async runtime to drive the audio graph".to_string())
        })?;

        let mut graph = AudioGraph::new(config.sample_rate, config.channels)?;
        for input in inputs {
            graph.connect(input)?;
        }

        let frames_per_quantum =
            ((config.sample_rate as u64 * config.mix_quantum_ms) / 1000).max(1) as usize;
        let output = graph.destination().clone();

        tracing::info!(
            "Audio mixer started with {} input(s) at {}Hz/{}ch",
            graph.nodes().len(),
            config.sample_rate,
            config.channels
        );

        let graph = Arc::new(Mutex::new(graph));
        let task = runtime.spawn(Self::pump(
            graph.clone(),
            config.mix_quantum(),
            frames_per_quantum,
        ));

        Ok(Self {
            graph,
            output,
            frames_per_quantum,
            task: Some(task),
        })
    }

    async fn pump(graph: Arc<Mutex<AudioGraph>>, quantum: Duration, frames: usize) {
        let mut ticker = tokio::time::interval(quantum);
        loop {
            ticker.tick().await;
            let mut guard = graph.lock();
            if guard.is_closed() {
                break;
            }
            guard.process(frames);
        }
    }

    /// Render `frames` frames right away
    pub fn process(&self, frames: usize) -> usize {
        self.graph.lock().process(frames)
    }

    pub fn frames_per_quantum(&self) -> usize {
        self.frames_per_quantum
    }

    /// Number of connected inputs
    pub fn input_count(&self) -> usize {
        self.graph.lock().nodes().len()
    }

    /// The mixed audio track
    pub fn output_track(&self) -> &MediaTrack {
        &self.output
    }

    /// Close the audio context and stop pumping. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut graph = self.graph.lock();
        if !graph.is_closed() {
            graph.close();
            tracing::debug!("Audio mixer cleaned up");
        }
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_silent_output_without_inputs() {
        let mixer = AudioMixer::new(&[], &RecorderConfig::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(mixer.input_count(), 0);
        assert!(mixer.output_track().is_live());
        assert!(mixer.output_track().buffered_samples() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_inputs_are_connected() {
        let mic = MediaTrack::audio("mic", 48_000, 1);
        let system = MediaTrack::audio("system", 48_000, 2);
        let mixer = AudioMixer::new(&[mic, system], &RecorderConfig::default()).unwrap();

        assert_eq!(mixer.input_count(), 2);
        assert_eq!(mixer.frames_per_quantum(), 480);
    }

    #[tokio::test]
    async fn test_invalid_format_is_audio_graph_failure() {
        let config = RecorderConfig {
            sample_rate: 0,
            ..RecorderConfig::default()
        };
        assert!(matches!(
            AudioMixer::new(&[], &config),
            Err(RecordingError::AudioGraphFailed(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            AudioMixer::new(&[], &RecorderConfig::default()),
            Err(RecordingError::AudioGraphFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_is_idempotent() {
        let mut mixer = AudioMixer::new(&[], &RecorderConfig::default()).unwrap();
        mixer.cleanup();
        mixer.cleanup();

        assert!(!mixer.output_track().is_live());
        assert_eq!(mixer.process(10), 0);
    }
}
