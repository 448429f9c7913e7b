//! Recording system module
//!
//! - RecordingCoordinator drives the session state machine
//! - Encoder trait and the chunked stream encoder
//! - Chunk buffer and artifact assembly

pub mod chunks;
pub mod container;
pub mod coordinator;
pub mod encoder;
pub mod session;
pub mod state;

pub use chunks::{Artifact, ChunkBuffer};
pub use container::ArtifactInfo;
pub use coordinator::{CompletionCallback, RecordingCoordinator};
pub use encoder::{
    EncodableStream, Encoder, EncoderEvent, EncoderFactory, EncoderState, StreamEncoder,
    StreamEncoderFactory,
};
pub use session::RecordingSession;
pub use state::{
    AudioRoutingPatch, AudioRoutingSettings, CaptureWarning, RecordingEvent, RecordingState,
    SessionPhase,
};
