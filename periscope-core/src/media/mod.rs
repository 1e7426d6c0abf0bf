//! The decode/present half of the pipeline.
//!
//! Payloads extracted from the stream flow through per-media decode
//! workers ([`dispatch`]), which turn them into pictures for the
//! [`present`] clock and chunks for the [`audio`] queue. The codec
//! itself is pluggable via the [`backend`] traits.

pub mod audio;
pub mod backend;
pub mod dispatch;
pub mod present;
pub mod types;

pub use audio::{AudioPlaybackQueue, AudioPump, AudioSink};
pub use backend::{
    AudioCodecFactory, AudioDecoder, AudioResampler, DecodeStep, PictureConverter, VideoCodecFactory,
    VideoDecoder,
};
pub use dispatch::{AudioDispatcher, VideoCompletion, VideoDispatcher};
pub use present::{PresentationClock, Presenter, RenderSink};
pub use types::{
    AudioChunk, DecodedPicture, MediaKind, MediaPayload, Orientation, RawPicture, RawSamples,
};
