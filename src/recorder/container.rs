//! Chunked live-recording container
//!
//! Layout:
//!
//! ```text
//! header:  "OSLV" | version u8 | track_count u8 | track_count x (kind u8, a u32 LE, b u32 LE)
//! packets: track u8 | timestamp_ms u64 LE | len u32 LE | payload
//! ```
//!
//! Video tracks store `(width, height)` and PNG payloads, each shown until the
//! next video packet. Audio tracks store `(sample_rate, channels)` and
//! interleaved f32 LE payloads.

use crate::capture::source::TrackKind;
use crate::utils::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};

pub const MAGIC: &[u8; 4] = b"OSLV";
pub const VERSION: u8 = 2;

const TRACK_ENTRY_LEN: usize = 9;
const PACKET_HEADER_LEN: usize = 13;

/// One entry of the track table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackEntry {
    Video { width: u32, height: u32 },
    #[serde(rename_all = "camelCase")]
    Audio { sample_rate: u32, channels: u32 },
}

impl TrackEntry {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackEntry::Video { .. } => TrackKind::Video,
            TrackEntry::Audio { .. } => TrackKind::Audio,
        }
    }
}

/// Serialize the container header
pub fn write_header(tracks: &[TrackEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + tracks.len() * TRACK_ENTRY_LEN);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(tracks.len() as u8);
    for track in tracks {
        let (kind, a, b) = match *track {
            TrackEntry::Video { width, height } => (0u8, width, height),
            TrackEntry::Audio {
                sample_rate,
                channels,
            } => (1u8, sample_rate, channels),
        };
        out.push(kind);
        out.extend_from_slice(&a.to_le_bytes());
        out.extend_from_slice(&b.to_le_bytes());
    }
    out
}

/// Append one packet to `out`
pub fn write_packet(out: &mut Vec<u8>, track: u8, timestamp_ms: u64, payload: &[u8]) {
    out.push(track);
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Summary of a parsed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub tracks: Vec<TrackEntry>,
    /// Packet count per track, indexed like `tracks`
    pub packets: Vec<u64>,
    /// Timestamp of the last packet
    pub last_timestamp_ms: u64,
}

impl ArtifactInfo {
    pub fn video_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video).count()
    }

    pub fn audio_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio).count()
    }
}

fn invalid(message: impl Into<String>) -> RecordingError {
    RecordingError::InvalidArtifact(message.into())
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Parse a complete container
pub fn parse(data: &[u8]) -> RecordingResult<ArtifactInfo> {
    if data.len() < 6 || &data[..4] != MAGIC {
        return Err(invalid("missing container header"));
    }
    if data[4] != VERSION {
        return Err(invalid(format!("unsupported container version {}", data[4])));
    }

    let count = data[5] as usize;
    let mut pos = 6;
    if data.len() < pos + count * TRACK_ENTRY_LEN {
        return Err(invalid("truncated track table"));
    }

    let mut tracks = Vec::with_capacity(count);
    for _ in 0..count {
        let a = read_u32(data, pos + 1);
        let b = read_u32(data, pos + 5);
        let entry = match data[pos] {
            0 => TrackEntry::Video {
                width: a,
                height: b,
            },
            1 => TrackEntry::Audio {
                sample_rate: a,
                channels: b,
            },
            other => return Err(invalid(format!("unknown track kind {other}"))),
        };
        tracks.push(entry);
        pos += TRACK_ENTRY_LEN;
    }

    let mut packets = vec![0u64; count];
    let mut last_timestamp_ms = 0;
    while pos < data.len() {
        if data.len() < pos + PACKET_HEADER_LEN {
            return Err(invalid("truncated packet header"));
        }
        let track = data[pos] as usize;
        let timestamp = read_u64(data, pos + 1);
        let len = read_u32(data, pos + 9) as usize;
        pos += PACKET_HEADER_LEN;

        if track >= count {
            return Err(invalid(format!("packet for unknown track {track}")));
        }
        if data.len() < pos + len {
            return Err(invalid("truncated packet payload"));
        }
        packets[track] += 1;
        last_timestamp_ms = last_timestamp_ms.max(timestamp);
        pos += len;
    }

    Ok(ArtifactInfo {
        tracks,
        packets,
        last_timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn av_header() -> Vec<u8> {
        write_header(&[
            TrackEntry::Video {
                width: 64,
                height: 36,
            },
            TrackEntry::Audio {
                sample_rate: 48_000,
                channels: 2,
            },
        ])
    }

    #[test]
    fn test_parse_counts_packets_per_track() {
        let mut data = av_header();
        write_packet(&mut data, 0, 0, &[1, 2, 3, 4]);
        write_packet(&mut data, 1, 10, &[0; 8]);
        write_packet(&mut data, 0, 33, &[1, 2, 3, 4]);

        let info = parse(&data).unwrap();
        assert_eq!(info.video_tracks(), 1);
        assert_eq!(info.audio_tracks(), 1);
        assert_eq!(info.packets, vec![2, 1]);
        assert_eq!(info.last_timestamp_ms, 33);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse(b"RIFF....").is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut data = av_header();
        write_packet(&mut data, 0, 0, &[1, 2, 3, 4]);
        data.truncate(data.len() - 2);

        assert!(matches!(parse(&data), Err(RecordingError::InvalidArtifact(_))));
    }

    #[test]
    fn test_rejects_unknown_track_index() {
        let mut data = av_header();
        write_packet(&mut data, 7, 0, &[]);
        assert!(parse(&data).is_err());
    }
}
