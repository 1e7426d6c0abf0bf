//! Engine configuration.
//!
//! Every tunable of the pipeline lives in [`SessionConfig`], with
//! defaults matching the reference stream server. Callers that only
//! need a host can use `SessionConfig::default()` untouched.

use std::time::Duration;

/// Default TCP port of the stream server.
pub const DEFAULT_PORT: u16 = 9876;

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for a [`ScreenSession`](crate::net::ScreenSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connect attempts per episode before giving up.
    pub connect_attempts: u32,
    /// Deadline for a single connect attempt.
    pub connect_timeout: Duration,
    /// Hard cap on the combined payload length a single frame header
    /// may declare. Larger values are treated as stream corruption.
    pub max_payload: usize,
    /// How long the stream may go without a complete frame before the
    /// episode is torn down and redialed.
    pub stall_timeout: Duration,
    /// Ceiling on buffered audio bytes; older chunks are dropped to
    /// keep playback near live.
    pub audio_ceiling: usize,
    /// Chunks that must accumulate before audio playback starts.
    pub audio_priming: usize,
    /// Poll interval of the audio drain loop.
    pub audio_poll: Duration,
    /// Tick interval of the presentation clock.
    pub display_tick: Duration,
    /// Coalescing window for touch-move events.
    pub touch_flush: Duration,
    /// Sample window for the smoothed fps figure.
    pub fps_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_timeout: Duration::from_millis(1000),
            max_payload: 16 * 1024 * 1024,
            stall_timeout: Duration::from_secs(5),
            audio_ceiling: 50_000,
            audio_priming: 8,
            audio_poll: Duration::from_millis(1),
            display_tick: Duration::from_millis(1),
            touch_flush: Duration::from_millis(16),
            fps_window: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.connect_attempts, 3);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(1000));
        assert_eq!(cfg.audio_ceiling, 50_000);
        assert_eq!(cfg.audio_priming, 8);
        assert_eq!(cfg.touch_flush, Duration::from_millis(16));
        assert_eq!(cfg.fps_window, 50);
    }
}
