//! Open ScreenStudio live capture engine
//!
//! Acquires the screen, camera and microphone, composites the camera over the
//! screen, mixes the audio inputs and records the result into one artifact for
//! the editor.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod mixer;
pub mod recorder;
pub mod utils;

pub use config::RecorderConfig;
pub use recorder::{Artifact, RecordingCoordinator, RecordingEvent, RecordingState};
pub use utils::error::{RecordingError, RecordingResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_screenstudio_capture=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
