//! Wire formats of the screen-stream protocol.
//!
//! [`frame`] covers the inbound direction (media frames from the
//! server), [`event`] the outbound direction (input records to the
//! server). Both are fixed big-endian layouts; no serialization
//! framework is involved.

pub mod event;
pub mod frame;

pub use event::{InputEvent, TouchEvent, TouchKind, INPUT_PROTOCOL_VERSION};
pub use frame::{FrameHeader, HeaderScan, VERSION_VIDEO, VERSION_VIDEO_AUDIO};
