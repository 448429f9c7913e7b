//! Recorder configuration
//!
//! Timing and format constants for a capture session. Every field has a
//! default, so a partial JSON file is enough.

use crate::capture::traits::Resolution;
use crate::utils::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the capture session engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Interval at which the encoder slices output into chunks
    pub chunk_interval_ms: u64,

    /// Rate at which the encoder samples the composited track
    pub frame_rate: u32,

    /// Compositor cadence (display refresh)
    pub render_rate_hz: u32,

    /// Sample rate of the mixed audio track
    pub sample_rate: u32,

    /// Channel count of the mixed audio track
    pub channels: u16,

    /// Size of one mixer processing block
    pub mix_quantum_ms: u64,

    /// How long compositor construction waits for a source's first frame
    pub ready_timeout_ms: u64,

    /// Canvas size when the screen does not report its dimensions
    pub default_canvas: Resolution,

    /// Distance between the camera overlay and the canvas edges
    pub overlay_margin: u32,

    /// Media type stamped on the finished artifact
    pub mime_type: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 1000,
            frame_rate: 30,
            render_rate_hz: 60,
            sample_rate: 48_000,
            channels: 2,
            mix_quantum_ms: 10,
            ready_timeout_ms: 5000,
            default_canvas: Resolution {
                width: 1920,
                height: 1080,
            },
            overlay_margin: 16,
            mime_type: "video/x-oss-live".to_string(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> RecordingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject timing values the engine cannot run with.
    ///
    /// Audio format is checked by the mixer itself when it builds its graph.
    pub fn validate(&self) -> RecordingResult<()> {
        let checks = [
            (self.chunk_interval_ms == 0, "chunkIntervalMs must be greater than 0"),
            (self.frame_rate == 0, "frameRate must be greater than 0"),
            (self.render_rate_hz == 0, "renderRateHz must be greater than 0"),
            (self.mix_quantum_ms == 0, "mixQuantumMs must be greater than 0"),
            (
                self.default_canvas.width == 0 || self.default_canvas.height == 0,
                "defaultCanvas must not be empty",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(RecordingError::Config(message.to_string())),
            None => Ok(()),
        }
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.render_rate_hz.max(1) as f64)
    }

    pub fn mix_quantum(&self) -> Duration {
        Duration::from_millis(self.mix_quantum_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{ "chunkIntervalMs": 250, "frameRate": 24 }"#).unwrap();

        let config = RecorderConfig::load(&path).unwrap();

        assert_eq!(config.chunk_interval_ms, 250);
        assert_eq!(config.frame_rate, 24);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.overlay_margin, 16);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{ "chunkIntervalMs": 0 }"#).unwrap();

        let result = RecorderConfig::load(&path);
        assert!(matches!(result, Err(RecordingError::Config(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            RecorderConfig::load(&path),
            Err(RecordingError::Serialization(_))
        ));
    }

    #[test]
    fn test_intervals() {
        let config = RecorderConfig::default();
        assert_eq!(config.chunk_interval(), Duration::from_secs(1));
        assert_eq!(config.mix_quantum(), Duration::from_millis(10));
        assert!(config.render_interval() < config.frame_interval());
    }
}
