//! Session statistics.
//!
//! Tracks frame arrival over a rolling sample window and derives a
//! smoothed fps figure, plus running totals the client surfaces in
//! its status line. A [`StatsTracker`] lives inside the session; the
//! published snapshot type is [`SessionStats`].

use std::collections::VecDeque;
use std::time::Instant;

// ── SessionStats ─────────────────────────────────────────────────

/// Point-in-time statistics snapshot exposed to the UI.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Current smoothed frames per second.
    pub fps: f64,
    /// Video frames received this episode.
    pub total_frames: u64,
    /// Video payload bytes received this episode, still compressed.
    pub total_bytes: u64,
    /// Last decoded picture width.
    pub width: u32,
    /// Last decoded picture height.
    pub height: u32,
    /// Header resyncs since the episode started.
    pub resyncs: u64,
    /// Payloads the decoder rejected.
    pub decode_failures: u64,
    /// Audio bytes the playback queue discarded to stay near live.
    pub dropped_audio_bytes: u64,
}

// ── StatsTracker ─────────────────────────────────────────────────

/// Accumulator behind [`SessionStats`].
///
/// Frame timing uses a rolling window of inter-arrival gaps; the fps
/// figure is the inverse of their mean.
pub struct StatsTracker {
    window: usize,
    gaps: VecDeque<f64>,
    last_frame: Option<Instant>,
    stats: SessionStats,
}

impl StatsTracker {
    /// `window` is the number of inter-arrival samples the fps figure
    /// averages over.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            gaps: VecDeque::with_capacity(window.max(1)),
            last_frame: None,
            stats: SessionStats::default(),
        }
    }

    /// Record a received video frame of `bytes` payload bytes.
    pub fn record_frame(&mut self, bytes: usize) {
        self.record_frame_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_frame_at(&mut self, when: Instant, bytes: usize) {
        self.stats.total_frames += 1;
        self.stats.total_bytes += bytes as u64;

        if let Some(last) = self.last_frame {
            let gap = when.duration_since(last).as_secs_f64();
            self.gaps.push_back(gap);
            if self.gaps.len() > self.window {
                self.gaps.pop_front();
            }
        }
        self.last_frame = Some(when);

        let mean: f64 = if self.gaps.is_empty() {
            0.0
        } else {
            self.gaps.iter().sum::<f64>() / self.gaps.len() as f64
        };
        self.stats.fps = if mean > 0.0 { 1.0 / mean } else { 0.0 };
    }

    /// Record the dimensions of the latest decoded picture.
    pub fn record_dimensions(&mut self, width: u32, height: u32) {
        self.stats.width = width;
        self.stats.height = height;
    }

    // The pipeline workers own these counters; the session polls
    // them into the snapshot.

    pub fn set_resyncs(&mut self, count: u64) {
        self.stats.resyncs = count;
    }

    pub fn set_decode_failures(&mut self, count: u64) {
        self.stats.decode_failures = count;
    }

    pub fn set_dropped_audio_bytes(&mut self, bytes: u64) {
        self.stats.dropped_audio_bytes = bytes;
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionStats {
        self.stats.clone()
    }

    /// Forget everything; called when a new connection episode opens.
    pub fn reset(&mut self) {
        self.gaps.clear();
        self.last_frame = None;
        self.stats = SessionStats::default();
    }
}

// ── Tests ────────────────────────────────────────────────────────
