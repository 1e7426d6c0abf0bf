//! Domain-specific error types for the periscope engine.
//!
//! All fallible operations return `Result<T, ScreenError>`.
//! No panics on wire input: every error is typed, and the session loop
//! decides whether an error ends one connection episode (reconnect) or
//! the whole session (fatal).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the screen-stream engine.
#[derive(Debug, Error)]
pub enum ScreenError {
    // ── Stream Errors ────────────────────────────────────────────
    /// The very first bytes of a stream did not carry a known
    /// protocol version. The peer does not speak this protocol.
    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedProtocol(u8),

    /// A frame header declared more payload than the configured cap.
    /// Treated as stream corruption; ends the connection episode.
    #[error("frame payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// No complete frame was reassembled within the liveness window.
    #[error("stream stalled: no complete frame for {0:?}")]
    StreamStalled(Duration),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant {
        type_name: &'static str,
        value: u64,
    },

    // ── Connection Errors ────────────────────────────────────────
    /// Every connect attempt in the episode budget failed.
    #[error("could not connect to {host} after {attempts} attempts")]
    ConnectFailed { host: String, attempts: u32 },

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An engine channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Codec Errors ─────────────────────────────────────────────
    /// Creating a decoder handle failed. Without a decoder the
    /// session cannot make progress, so this is fatal.
    #[error("codec initialization failed: {0}")]
    CodecInit(#[source] CodecError),

    // ── State Errors ─────────────────────────────────────────────
    /// A connection state transition violated the lifecycle rules.
    #[error("state violation: {0}")]
    StateViolation(&'static str),
}

impl ScreenError {
    /// Whether this error ends the session outright.
    ///
    /// Non-fatal errors end the current connection episode and route
    /// through the reconnect path instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedProtocol(_)
                | Self::ConnectFailed { .. }
                | Self::CodecInit(_)
                | Self::ChannelClosed
                | Self::StateViolation(_)
        )
    }
}

// ── CodecError ───────────────────────────────────────────────────

/// Typed error for the pluggable decode/transform backends.
///
/// A `CodecError` from a per-payload operation never crosses the
/// pipeline boundary: the dispatcher logs it, counts it, and accepts
/// the next payload. Only handle creation escalates to `ScreenError`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Creating the codec handle failed.
    #[error("init: {0}")]
    Init(String),

    /// The codec rejected the payload bytes.
    #[error("decode: {0}")]
    Decode(String),

    /// Pixel or sample conversion failed.
    #[error("convert: {0}")]
    Convert(String),

    /// The decoder reported neither progress nor output, which would
    /// loop forever if fed again.
    #[error("decoder consumed 0 of {0} bytes")]
    Stalled(usize),
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScreenError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScreenError::ChannelClosed
    }
}

impl From<tokio::sync::watch::error::RecvError> for ScreenError {
    fn from(_: tokio::sync::watch::error::RecvError) -> Self {
        ScreenError::ChannelClosed
    }
}
