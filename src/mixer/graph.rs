//! Real-time audio summation graph
//!
//! Each connected input feeds a gain node; every gain node feeds the single
//! destination, whose track is the mixer output.

use crate::capture::source::{MediaTrack, TrackKind};
use crate::utils::error::{RecordingError, RecordingResult};

/// Gain stage for one input track
#[derive(Debug)]
pub struct GainNode {
    track: MediaTrack,
    channels: u16,
    gain: f32,
}

impl GainNode {
    fn new(track: MediaTrack, fallback_channels: u16) -> Self {
        let channels = track.settings().channels.filter(|&c| c > 0).unwrap_or(fallback_channels);
        Self {
            track,
            channels,
            gain: 1.0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn track(&self) -> &MediaTrack {
        &self.track
    }
}

/// Audio context: gain nodes summed into one destination track
#[derive(Debug)]
pub struct AudioGraph {
    sample_rate: u32,
    channels: u16,
    nodes: Vec<GainNode>,
    destination: MediaTrack,
    closed: bool,
}

impl AudioGraph {
    /// Create the context. Fails when the format cannot be rendered.
    pub fn new(sample_rate: u32, channels: u16) -> RecordingResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(RecordingError::AudioGraphFailed(format!(
                "cannot create audio context at {sample_rate}Hz with {channels} channels"
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            nodes: Vec::new(),
            destination: MediaTrack::audio("Mixed Audio", sample_rate, channels),
            closed: false,
        })
    }

    /// Connect an input through a unity-gain node
    pub fn connect(&mut self, track: &MediaTrack) -> RecordingResult<()> {
        if self.closed {
            return Err(RecordingError::AudioGraphFailed("audio context is closed".to_string()));
        }
        if track.kind() != TrackKind::Audio {
            return Err(RecordingError::AudioGraphFailed(format!(
                "track '{}' is not an audio track",
                track.label()
            )));
        }
        let input_rate = track.settings().sample_rate.unwrap_or(self.sample_rate);
        if input_rate != self.sample_rate {
            tracing::warn!(
                "Input '{}' runs at {}Hz, mixing at {}Hz without resampling",
                track.label(),
                input_rate,
                self.sample_rate
            );
        }
        self.nodes.push(GainNode::new(track.clone(), self.channels));
        Ok(())
    }

    pub fn nodes(&self) -> &[GainNode] {
        &self.nodes
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn destination(&self) -> &MediaTrack {
        &self.destination
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Render `frames` frames into the destination. With no inputs this is silence.
    pub fn process(&mut self, frames: usize) -> usize {
        if self.closed || frames == 0 {
            return 0;
        }
        let out_channels = self.channels as usize;
        let mut mix = vec![0.0f32; frames * out_channels];

        for node in &self.nodes {
            let in_channels = node.channels as usize;
            let input = node.track.pull_samples(frames * in_channels);
            let adapted = adapt_channels(&input, in_channels, out_channels);
            for (out, sample) in mix.iter_mut().zip(adapted) {
                *out += sample * node.gain;
            }
        }

        for sample in mix.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.destination.push_samples(&mix);
        frames
    }

    /// Disconnect every node and end the destination. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.nodes.clear();
        self.destination.stop();
    }
}

/// Convert interleaved samples between channel layouts.
///
/// Mono is duplicated to every output channel; anything else going to mono is
/// averaged; other mismatches map channels by index and fill the rest with silence.
fn adapt_channels(input: &[f32], in_channels: usize, out_channels: usize) -> Vec<f32> {
    if in_channels == out_channels || in_channels == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_channels;
    let mut out = Vec::with_capacity(frames * out_channels);

    for frame in input.chunks_exact(in_channels) {
        if in_channels == 1 {
            out.extend(std::iter::repeat(frame[0]).take(out_channels));
        } else if out_channels == 1 {
            out.push(frame.iter().sum::<f32>() / in_channels as f32);
        } else {
            for ch in 0..out_channels {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_format_fails() {
        assert!(matches!(
            AudioGraph::new(0, 2),
            Err(RecordingError::AudioGraphFailed(_))
        ));
        assert!(matches!(
            AudioGraph::new(48_000, 0),
            Err(RecordingError::AudioGraphFailed(_))
        ));
    }

    #[test]
    fn test_sums_inputs_at_unity_gain() {
        let mut graph = AudioGraph::new(48_000, 1).unwrap();
        let mic = MediaTrack::audio("mic", 48_000, 1);
        let system = MediaTrack::audio("system", 48_000, 1);
        graph.connect(&mic).unwrap();
        graph.connect(&system).unwrap();

        mic.push_samples(&[0.25, 0.5]);
        system.push_samples(&[0.25, -0.5]);
        graph.process(2);

        assert!(graph.nodes().iter().all(|n| n.gain() == 1.0));
        assert_eq!(graph.destination().pull_samples(2), vec![0.5, 0.0]);
    }

    #[test]
    fn test_sum_is_clamped() {
        let mut graph = AudioGraph::new(48_000, 1).unwrap();
        let a = MediaTrack::audio("a", 48_000, 1);
        let b = MediaTrack::audio("b", 48_000, 1);
        graph.connect(&a).unwrap();
        graph.connect(&b).unwrap();

        a.push_samples(&[0.9]);
        b.push_samples(&[0.9]);
        graph.process(1);

        assert_eq!(graph.destination().pull_samples(1), vec![1.0]);
    }

    #[test]
    fn test_no_inputs_produces_silence() {
        let mut graph = AudioGraph::new(48_000, 2).unwrap();
        assert_eq!(graph.process(480), 480);
        assert_eq!(graph.destination().buffered_samples(), 960);
        assert!(graph.destination().pull_samples(960).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_input_is_spread_to_stereo() {
        let mut graph = AudioGraph::new(48_000, 2).unwrap();
        let mic = MediaTrack::audio("mic", 48_000, 1);
        graph.connect(&mic).unwrap();

        mic.push_samples(&[0.5]);
        graph.process(1);

        assert_eq!(graph.destination().pull_samples(2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_rejects_video_track() {
        let mut graph = AudioGraph::new(48_000, 2).unwrap();
        let video = MediaTrack::video("screen", 8, 8);
        assert!(graph.connect(&video).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut graph = AudioGraph::new(48_000, 2).unwrap();
        graph.connect(&MediaTrack::audio("mic", 48_000, 1)).unwrap();
        graph.close();
        graph.close();

        assert!(graph.is_closed());
        assert!(graph.nodes().is_empty());
        assert!(!graph.destination().is_live());
        assert_eq!(graph.process(10), 0);
    }

    #[test]
    fn test_adapt_stereo_to_mono() {
        assert_eq!(adapt_channels(&[0.25, 0.75, 1.0, 0.0], 2, 1), vec![0.5, 0.5]);
    }
}
