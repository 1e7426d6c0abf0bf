//! # periscope-core
//!
//! Client engine for a low-latency remote-screen stream.
//!
//! This crate contains:
//! - **Protocol types**: `FrameHeader` for inbound media frames,
//!   `InputEvent`/`TouchEvent` for the outbound input records
//! - **Codec**: `ScreenCodec` for framed TCP I/O via `tokio_util`,
//!   with mid-stream resynchronisation
//! - **Reassembly**: `FrameReassembler` turning a TCP byte stream
//!   into complete media payloads
//! - **Media**: decode workers, the latest-frame-wins presentation
//!   clock, and the bounded audio playback queue, all behind
//!   pluggable codec backend traits
//! - **Network**: `ConnectionController` for the dial/retry state
//!   machine and `ScreenSession` as the supervisor tying the whole
//!   pipeline together
//! - **Input**: immediate key events and coalesced touch with
//!   local-to-remote coordinate mapping
//! - **Stats**: rolling-window fps and session counters published
//!   over a watch channel
//! - **Error**: `ScreenError` — typed, `thiserror`-based error
//!   hierarchy with a fatal/episode split

pub mod codec;
pub mod config;
pub mod error;
pub mod input;
pub mod media;
pub mod net;
pub mod protocol;
pub mod reassembler;
pub mod stats;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{ScreenCodec, WireFrame};
pub use config::{SessionConfig, DEFAULT_PORT};
pub use error::{CodecError, ScreenError};
pub use input::{InputChannel, ViewGeometry};
pub use media::{
    AudioCodecFactory, AudioPlaybackQueue, AudioSink, DecodedPicture, MediaKind, MediaPayload,
    Orientation, PresentationClock, RenderSink, VideoCodecFactory,
};
pub use net::{ConnectionState, ScreenSession, SessionHandles};
pub use protocol::{FrameHeader, InputEvent, TouchEvent, TouchKind};
pub use reassembler::FrameReassembler;
pub use stats::SessionStats;
