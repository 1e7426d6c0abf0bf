//! Stream codec: frame extraction and input-record encoding.
//!
//! [`ScreenCodec`] is the single place wire bytes are interpreted.
//! The decode half scans a [`BytesMut`] for complete media frames and
//! hands them out as [`WireFrame`]s; the encode half appends outbound
//! [`InputEvent`] records. Both halves plug into `tokio_util`
//! framing, and the decode half is equally usable offline through
//! [`FrameReassembler`](crate::reassembler::FrameReassembler).
//!
//! ## Consumption rules
//!
//! - A frame is consumed only when header and every declared payload
//!   byte are present; partial frames stay buffered untouched.
//! - Frames that declare no payload at all are consumed silently.
//! - Every consumed frame, keep-alives included, advances
//!   [`frames_consumed`](ScreenCodec::frames_consumed). Stream
//!   liveness is judged by that count, not by raw socket bytes.
//! - An unknown version byte mid-stream drops exactly one byte and
//!   rescans until a known header lines up again. The same byte at
//!   the very start of a stream is fatal: the peer does not speak
//!   this protocol.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ScreenError;
use crate::media::types::Orientation;
use crate::protocol::event::InputEvent;
use crate::protocol::frame::{FrameHeader, HeaderScan};

// ── WireFrame ────────────────────────────────────────────────────

/// One media frame extracted from the stream.
///
/// `video` and `audio` are zero-copy slices of the receive buffer;
/// a `None` lane declared zero bytes. Frames with both lanes `None`
/// never leave the codec.
#[derive(Debug, Clone)]
pub struct WireFrame {
    pub orientation: Orientation,
    pub video: Option<Bytes>,
    pub audio: Option<Bytes>,
}

// ── ScreenCodec ──────────────────────────────────────────────────

/// Decoder for inbound media frames, encoder for outbound input
/// records.
pub struct ScreenCodec {
    max_payload: usize,
    /// A structurally valid header has been seen since [`reset`](Self::reset).
    synced: bool,
    /// Currently discarding bytes looking for the next header.
    skipping: bool,
    resyncs: u64,
    frames: u64,
}

impl ScreenCodec {
    /// `max_payload` caps the combined payload length a header may
    /// declare before the stream is treated as corrupt.
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            synced: false,
            skipping: false,
            resyncs: 0,
            frames: 0,
        }
    }

    /// Forget all stream state. Called at the start of every
    /// connection episode; afterwards the first byte must again be a
    /// valid version or the stream is rejected outright.
    pub fn reset(&mut self) {
        self.synced = false;
        self.skipping = false;
        self.resyncs = 0;
        self.frames = 0;
    }

    /// Desync episodes recovered from since the last reset.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Whole frames consumed since the last reset, keep-alives
    /// included. A declared payload that never completes leaves this
    /// count untouched no matter how many bytes trickle in.
    pub fn frames_consumed(&self) -> u64 {
        self.frames
    }
}

impl Decoder for ScreenCodec {
    type Item = WireFrame;
    type Error = ScreenError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireFrame>, ScreenError> {
        loop {
            let header = match FrameHeader::scan(src) {
                HeaderScan::Incomplete => return Ok(None),
                HeaderScan::UnknownVersion(version) => {
                    if !self.synced {
                        return Err(ScreenError::UnsupportedProtocol(version));
                    }
                    if !self.skipping {
                        self.skipping = true;
                        self.resyncs += 1;
                        warn!(version, "lost frame sync, scanning for next header");
                    }
                    src.advance(1);
                    continue;
                }
                HeaderScan::Complete(header) => header,
            };

            self.synced = true;
            header.check_payload(self.max_payload)?;

            if src.len() < header.frame_len() {
                src.reserve(header.frame_len() - src.len());
                return Ok(None);
            }
            self.skipping = false;

            // Everything is buffered: consume header and payloads in
            // one step.
            let mut frame = src.split_to(header.frame_len());
            frame.advance(header.size());
            self.frames += 1;

            let video = (header.video_len > 0)
                .then(|| frame.split_to(header.video_len as usize).freeze());
            let audio = (header.audio_len > 0)
                .then(|| frame.split_to(header.audio_len as usize).freeze());

            if video.is_none() && audio.is_none() {
                // Keep-alive frame; nothing to dispatch.
                continue;
            }

            return Ok(Some(WireFrame {
                orientation: Orientation::from_wire(header.orientation),
                video,
                audio,
            }));
        }
    }
}

impl Encoder<InputEvent> for ScreenCodec {
    type Error = ScreenError;

    fn encode(&mut self, item: InputEvent, dst: &mut BytesMut) -> Result<(), ScreenError> {
        item.encode_into(dst);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
