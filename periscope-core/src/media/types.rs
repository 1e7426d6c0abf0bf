//! Shared types for the decode/present pipeline.
//!
//! These are **internal** representations used between pipeline
//! stages. They are distinct from [`crate::protocol::frame`], which
//! describes the wire layout the server sends.

use bytes::Bytes;

// ── Orientation ──────────────────────────────────────────────────

/// Screen orientation in counter-clockwise quarter turns.
///
/// The wire carries this as a raw byte per frame; a view offset (user
/// rotation, in quarter turns) can be added on top. Arithmetic wraps
/// modulo four, so `-1` and `3` name the same orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// Natural orientation.
    #[default]
    Deg0,
    /// One quarter turn.
    Deg90,
    /// Upside down.
    Deg180,
    /// Three quarter turns.
    Deg270,
}

impl Orientation {
    /// Map the wire byte onto an orientation. Values beyond 3 wrap.
    pub fn from_wire(byte: u8) -> Self {
        match byte % 4 {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    /// Quarter turns as a number (0..=3).
    pub const fn quarter_turns(self) -> u8 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    /// This orientation rotated by `turns` additional quarter turns.
    /// Negative values rotate the other way.
    pub fn turned(self, turns: i8) -> Self {
        let base = self.quarter_turns() as i16;
        Self::from_wire((base + turns as i16).rem_euclid(4) as u8)
    }

    /// Rotation angle in degrees, counter-clockwise.
    pub const fn degrees(self) -> u16 {
        self.quarter_turns() as u16 * 90
    }

    /// Whether width and height swap when rendering at this
    /// orientation.
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

// ── MediaKind ────────────────────────────────────────────────────

/// Which decode lane a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

// ── MediaPayload ─────────────────────────────────────────────────

/// One complete payload extracted from the stream, still encoded.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub kind: MediaKind,
    /// Encoded bytes, exactly as they appeared on the wire.
    pub data: Bytes,
    /// Orientation the carrying frame declared.
    pub orientation: Orientation,
}

// ── RawPicture ───────────────────────────────────────────────────

/// A decoded picture as the video codec hands it out, before pixel
/// conversion. The layout is codec-specific (typically planar YUV);
/// the matching [`PictureConverter`](crate::media::PictureConverter)
/// knows how to read it.
#[derive(Debug, Clone)]
pub struct RawPicture {
    /// Picture width in pixels.
    pub width: u32,
    /// Picture height in pixels.
    pub height: u32,
    /// Codec-native plane data.
    pub planes: Vec<Vec<u8>>,
    /// Per-plane row pitch in bytes.
    pub strides: Vec<usize>,
}

// ── DecodedPicture ───────────────────────────────────────────────

/// A fully converted picture, ready for a render sink.
///
/// `data` holds `height` rows of `width * 3` bytes of interleaved
/// RGB24. `orientation` is the effective orientation (stream value
/// plus view offset); rotation itself is the render sink's job.
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub orientation: Orientation,
}

impl DecodedPicture {
    /// Total byte size of the RGB24 bitmap.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

// ── RawSamples ───────────────────────────────────────────────────

/// Decoded audio as the codec hands it out, before resampling.
#[derive(Debug, Clone)]
pub struct RawSamples {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u8,
    /// Codec-native sample data.
    pub data: Vec<u8>,
}

// ── AudioChunk ───────────────────────────────────────────────────

/// Playback-ready audio: 16-bit interleaved stereo PCM at the sink's
/// fixed rate.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
}

impl AudioChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
