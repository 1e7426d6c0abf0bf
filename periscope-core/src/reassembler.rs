//! Frame reassembly over arbitrary read chunks.
//!
//! TCP hands the session byte runs with no relation to frame
//! boundaries. [`FrameReassembler`] buffers them and drains complete
//! payloads through the [`ScreenCodec`], so the session read loop and
//! offline callers (tests, stream dumps) share one parser. Payload
//! extraction is chunk-boundary independent: any split of the same
//! byte stream yields the same payload sequence.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::ScreenCodec;
use crate::error::ScreenError;
use crate::media::types::{MediaKind, MediaPayload};

// ── FrameReassembler ─────────────────────────────────────────────

/// Accumulates stream bytes and yields complete media payloads.
pub struct FrameReassembler {
    codec: ScreenCodec,
    buf: BytesMut,
    /// Payloads extracted but not yet handed out. A v4 frame yields
    /// two (video first, matching wire order).
    ready: VecDeque<MediaPayload>,
}

impl FrameReassembler {
    /// `max_payload` caps the combined payload length one frame may
    /// declare.
    pub fn new(max_payload: usize) -> Self {
        Self {
            codec: ScreenCodec::new(max_payload),
            buf: BytesMut::with_capacity(64 * 1024),
            ready: VecDeque::new(),
        }
    }

    /// Append received bytes. Call [`next`](Self::next) afterwards
    /// until it returns `None`.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete payload, if one is buffered.
    ///
    /// `Err` means the stream itself is bad (unknown version at
    /// stream start, oversized declared payload); the session tears
    /// the episode down in response.
    pub fn next(&mut self) -> Result<Option<MediaPayload>, ScreenError> {
        if let Some(payload) = self.ready.pop_front() {
            return Ok(Some(payload));
        }

        let Some(frame) = self.codec.decode(&mut self.buf)? else {
            return Ok(None);
        };

        if let Some(video) = frame.video {
            self.ready.push_back(MediaPayload {
                kind: MediaKind::Video,
                data: video,
                orientation: frame.orientation,
            });
        }
        if let Some(audio) = frame.audio {
            self.ready.push_back(MediaPayload {
                kind: MediaKind::Audio,
                data: audio,
                orientation: frame.orientation,
            });
        }

        Ok(self.ready.pop_front())
    }

    /// Discard buffered bytes, pending payloads, and stream state.
    /// Called whenever a connection episode opens.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.ready.clear();
        self.codec.reset();
    }

    /// Bytes waiting for more data before they parse.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Desync episodes recovered from since the last reset.
    pub fn resyncs(&self) -> u64 {
        self.codec.resyncs()
    }

    /// Whole wire frames consumed since the last reset, keep-alives
    /// included. The session's stall watchdog keys off this count, so
    /// a trickle of bytes that never finishes a frame is not
    /// liveness.
    pub fn frames_consumed(&self) -> u64 {
        self.codec.frames_consumed()
    }
}

// ── Tests ────────────────────────────────────────────────────────
