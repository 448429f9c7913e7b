//! Chunk buffer and artifact assembly
//!
//! Encoded chunks are kept in arrival order and concatenated into the final
//! artifact once the encoder reports completion.

use super::container::{self, ArtifactInfo};
use crate::utils::error::RecordingResult;
use std::path::Path;

/// Append-only buffer of encoded chunks
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate every chunk into an artifact of the given media type
    pub fn assemble(&self, mime_type: &str) -> Artifact {
        let mut data = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        Artifact {
            mime_type: mime_type.to_string(),
            data,
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }
}

/// Finished recording handed to the editor: opaque media bytes plus type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    mime_type: String,
    data: Vec<u8>,
}

impl Artifact {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Parse the container header and count packets per track
    pub fn probe(&self) -> RecordingResult<ArtifactInfo> {
        container::parse(&self.data)
    }

    /// Write the artifact bytes to `path`
    pub fn write_to(&self, path: &Path) -> RecordingResult<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_preserves_arrival_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(vec![1, 2]);
        buffer.push(Vec::new());
        buffer.push(vec![3]);
        buffer.push(vec![4, 5, 6]);

        let artifact = buffer.assemble("video/x-oss-live");
        assert_eq!(buffer.len(), 3);
        assert_eq!(artifact.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(artifact.mime_type(), "video/x-oss-live");
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(vec![0; 16]);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
        assert_eq!(buffer.assemble("x").size(), 0);
    }
}
