//! Inbound media frame format.
//!
//! Every frame the server sends starts with a small header, followed
//! immediately by the payloads it declares:
//!
//! ```text
//! version:      u8   (1)   3 = video only, 4 = video + audio
//! orientation:  u8   (1)   quarter turns, counter-clockwise
//! video_len:    u32  (4)   big-endian, may be 0
//! audio_len:    u32  (4)   big-endian, v4 only
//! video:        [u8] (video_len)   H.264 Annex-B
//! audio:        [u8] (audio_len)   AAC
//! ```
//!
//! The header is 6 bytes for version 3 and 10 bytes for version 4.
//! Frames where every declared length is 0 are legal keep-alives.

use crate::error::ScreenError;

// ── Constants ────────────────────────────────────────────────────

/// Protocol version carrying video only.
pub const VERSION_VIDEO: u8 = 3;

/// Protocol version carrying video and audio.
pub const VERSION_VIDEO_AUDIO: u8 = 4;

// ── FrameHeader ──────────────────────────────────────────────────

/// Parsed per-frame metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    /// Raw orientation byte; quarter turns beyond 3 wrap.
    pub orientation: u8,
    pub video_len: u32,
    pub audio_len: u32,
}

/// Outcome of scanning a buffer for a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderScan {
    /// More bytes are needed before the header can be read.
    Incomplete,
    /// A complete, well-formed header.
    Complete(FrameHeader),
    /// The leading byte is not a known protocol version.
    UnknownVersion(u8),
}

impl FrameHeader {
    /// Header size for version 3.
    pub const BASE_SIZE: usize = 6;

    /// Header size for version 4.
    pub const EXTENDED_SIZE: usize = 10;

    /// Encoded header size for this frame's version.
    pub fn size(&self) -> usize {
        match self.version {
            VERSION_VIDEO_AUDIO => Self::EXTENDED_SIZE,
            _ => Self::BASE_SIZE,
        }
    }

    /// Combined declared payload length.
    pub fn payload_len(&self) -> usize {
        self.video_len as usize + self.audio_len as usize
    }

    /// Total frame length on the wire, header included.
    pub fn frame_len(&self) -> usize {
        self.size() + self.payload_len()
    }

    /// Scan the front of `buf` for a header.
    ///
    /// Never consumes bytes; the caller decides what to do with the
    /// result. A version-3 header always reports `audio_len` 0.
    pub fn scan(buf: &[u8]) -> HeaderScan {
        let Some(&version) = buf.first() else {
            return HeaderScan::Incomplete;
        };
        let header_len = match version {
            VERSION_VIDEO => Self::BASE_SIZE,
            VERSION_VIDEO_AUDIO => Self::EXTENDED_SIZE,
            other => return HeaderScan::UnknownVersion(other),
        };
        if buf.len() < header_len {
            return HeaderScan::Incomplete;
        }

        let orientation = buf[1];
        let video_len = u32::from_be_bytes(buf[2..6].try_into().unwrap());
        let audio_len = if version == VERSION_VIDEO_AUDIO {
            u32::from_be_bytes(buf[6..10].try_into().unwrap())
        } else {
            0
        };

        HeaderScan::Complete(Self {
            version,
            orientation,
            video_len,
            audio_len,
        })
    }

    /// Serialize to bytes (big-endian). Used by tests and stream
    /// generators; real clients only ever parse this direction.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.push(self.version);
        buf.push(self.orientation);
        buf.extend_from_slice(&self.video_len.to_be_bytes());
        if self.version == VERSION_VIDEO_AUDIO {
            buf.extend_from_slice(&self.audio_len.to_be_bytes());
        }
        buf
    }

    /// Validate declared lengths against the configured payload cap.
    pub fn check_payload(&self, max_payload: usize) -> Result<(), ScreenError> {
        let size = self.payload_len();
        if size > max_payload {
            return Err(ScreenError::PayloadTooLarge {
                size,
                max: max_payload,
            });
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
