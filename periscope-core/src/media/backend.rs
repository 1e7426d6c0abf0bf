//! Pluggable decode and transform backends.
//!
//! The engine does not link a codec. Callers supply implementations
//! of these traits (FFI bindings, a software decoder, or the probe
//! backend from the client crate) and the dispatchers drive them.
//!
//! Decoders follow the stepwise contract of packet codecs: one call
//! consumes some prefix of the input and may or may not emit an item.
//! The dispatcher keeps feeding the remainder until the payload is
//! used up, so an implementation is free to consume partially.

use crate::error::CodecError;
use crate::media::types::{RawPicture, RawSamples};

// ── DecodeStep ───────────────────────────────────────────────────

/// Result of a single decoder call.
#[derive(Debug)]
pub struct DecodeStep<T> {
    /// How many input bytes the call consumed. `0` together with no
    /// output means the decoder cannot make progress on this input.
    pub consumed: usize,
    /// An item, if the codec finished one this call.
    pub output: Option<T>,
}

// ── Decoder traits ───────────────────────────────────────────────

/// A stateful video decoder handle (one compressed stream in, raw
/// pictures out).
pub trait VideoDecoder: Send {
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawPicture>, CodecError>;
}

/// A stateful audio decoder handle.
pub trait AudioDecoder: Send {
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStep<RawSamples>, CodecError>;
}

// ── Transform traits ─────────────────────────────────────────────

/// Converts codec-native pictures into interleaved RGB24.
///
/// The destination buffer is owned by the dispatcher so it can be
/// reused across frames of the same size.
pub trait PictureConverter: Send {
    /// Required `dst` length for this picture.
    fn output_len(&self, picture: &RawPicture) -> usize {
        picture.width as usize * picture.height as usize * 3
    }

    /// Fill `dst` with the converted picture. `dst` is exactly
    /// [`output_len`](Self::output_len) bytes.
    fn convert(&mut self, picture: &RawPicture, dst: &mut [u8]) -> Result<(), CodecError>;
}

/// Converts codec-native samples into 16-bit interleaved stereo PCM
/// at the playback rate.
pub trait AudioResampler: Send {
    fn resample(&mut self, samples: &RawSamples) -> Result<Vec<u8>, CodecError>;
}

// ── Factories ────────────────────────────────────────────────────

/// Creates video decode handles.
///
/// Handles are created lazily when the first payload of a connection
/// episode arrives, and dropped when the episode ends, so every
/// episode decodes with fresh codec state. A factory failure is fatal
/// to the session.
pub trait VideoCodecFactory: Send + Sync {
    fn create_decoder(&self) -> Result<Box<dyn VideoDecoder>, CodecError>;
    fn create_converter(&self) -> Result<Box<dyn PictureConverter>, CodecError>;
}

/// Creates audio decode handles. Same lifecycle as
/// [`VideoCodecFactory`].
pub trait AudioCodecFactory: Send + Sync {
    fn create_decoder(&self) -> Result<Box<dyn AudioDecoder>, CodecError>;
    fn create_resampler(&self) -> Result<Box<dyn AudioResampler>, CodecError>;
}
