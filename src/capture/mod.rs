//! Capture acquirers
//!
//! Screen, camera and microphone acquisition behind one backend trait, plus
//! the source and track handles they hand back.

pub mod source;
pub mod synthetic;
pub mod traits;

#[cfg(any(feature = "microphone-cpal", feature = "camera-nokhwa"))]
pub mod devices;

pub use source::{CaptureSource, MediaTrack, SourceKind, TrackKind, TrackSettings, TrackState, VideoFrame};
pub use synthetic::{DeviceOutcome, ScreenOutcome, SyntheticBackend, SyntheticConfig};
pub use traits::{AudioDeviceInfo, CameraInfo, CaptureBackend, DisplayInfo, Resolution};
