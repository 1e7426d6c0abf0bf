//! Audio buffering and playback metering.
//!
//! Decoded chunks land in an [`AudioPlaybackQueue`] shared between
//! the audio decode worker (producer) and an [`AudioPump`] task
//! (consumer). The queue keeps playback near live by discarding its
//! oldest chunks whenever the buffered byte total climbs over a
//! ceiling, and withholds output until a priming depth is reached so
//! playback does not start with an instant underrun.
//!
//! The pump is deliberately dumb: every poll tick it asks the sink
//! how much it can take and feeds it whole chunks that fit. All
//! pacing comes from the sink draining at its sample rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::media::types::AudioChunk;

// ── AudioSink ────────────────────────────────────────────────────

/// Destination for playback-ready PCM.
///
/// Implementations wrap an OS audio buffer or a test capture. The
/// pump never writes more than the sink just reported free.
pub trait AudioSink: Send {
    /// Bytes the sink can accept right now without blocking.
    fn free_capacity(&self) -> usize;

    /// Write PCM bytes into the sink.
    fn write(&mut self, pcm: &[u8]) -> std::io::Result<()>;
}

// ── AudioPlaybackQueue ───────────────────────────────────────────

struct QueueState {
    chunks: VecDeque<AudioChunk>,
    /// Byte total across `chunks`.
    buffered: usize,
    primed: bool,
}

/// Bounded, priming, drop-oldest chunk queue.
///
/// All methods take `&self`; the queue is shared as
/// `Arc<AudioPlaybackQueue>` between the decode worker and the pump.
pub struct AudioPlaybackQueue {
    state: Mutex<QueueState>,
    ceiling: usize,
    priming: usize,
    dropped: AtomicU64,
}

impl AudioPlaybackQueue {
    /// `ceiling` caps the buffered byte total; `priming` is the chunk
    /// depth required before [`pull`](Self::pull) starts yielding.
    pub fn new(ceiling: usize, priming: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::new(),
                buffered: 0,
                primed: false,
            }),
            ceiling,
            priming,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a chunk, discarding from the front until the byte total
    /// fits the ceiling again. The survivors are always the most
    /// recent suffix of everything pushed.
    pub fn push(&self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        let mut state = self.lock();
        state.buffered += chunk.len();
        state.chunks.push_back(chunk);

        while state.buffered > self.ceiling {
            match state.chunks.pop_front() {
                Some(old) => {
                    state.buffered -= old.len();
                    self.dropped.fetch_add(old.len() as u64, Ordering::Relaxed);
                }
                None => break,
            }
        }

        if !state.primed && state.chunks.len() >= self.priming {
            state.primed = true;
            debug!(chunks = state.chunks.len(), "audio queue primed");
        }
    }

    /// Pop the oldest chunk. Returns `None` while the queue is empty
    /// or has not primed yet. Priming latches: once reached it only
    /// re-arms on [`clear`](Self::clear).
    pub fn pull(&self) -> Option<AudioChunk> {
        let mut state = self.lock();
        if !state.primed {
            return None;
        }
        let chunk = state.chunks.pop_front()?;
        state.buffered -= chunk.len();
        Some(chunk)
    }

    /// Pop the oldest chunk only if it fits in `capacity` bytes.
    ///
    /// Check and pop happen under one lock, so a chunk can never be
    /// taken on the strength of stale capacity information.
    pub fn pull_fitting(&self, capacity: usize) -> Option<AudioChunk> {
        let mut state = self.lock();
        if !state.primed {
            return None;
        }
        if state.chunks.front()?.len() > capacity {
            return None;
        }
        let chunk = state.chunks.pop_front()?;
        state.buffered -= chunk.len();
        Some(chunk)
    }

    /// Drop everything and re-arm priming. Called when a connection
    /// episode ends.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.chunks.clear();
        state.buffered = 0;
        state.primed = false;
    }

    /// Byte total currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().buffered
    }

    /// Chunks currently buffered.
    pub fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Whether the priming depth has been reached.
    pub fn is_primed(&self) -> bool {
        self.lock().primed
    }

    /// Bytes discarded by the ceiling since construction.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ── AudioPump ────────────────────────────────────────────────────

/// Drains the queue into an [`AudioSink`] on a fixed poll interval.
pub struct AudioPump {
    queue: Arc<AudioPlaybackQueue>,
    sink: Box<dyn AudioSink>,
    poll: Duration,
    running: Arc<AtomicBool>,
}

impl AudioPump {
    pub fn new(queue: Arc<AudioPlaybackQueue>, sink: Box<dyn AudioSink>, poll: Duration) -> Self {
        Self {
            queue,
            sink,
            poll,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A cloneable handle that stops the pump from another task.
    /// Flipping it before [`run`](Self::run) is scheduled still wins:
    /// the loop checks the flag before its first write.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the drain loop until the stop handle flips.
    ///
    /// Intended to be spawned on the runtime. Each tick writes every
    /// queued chunk that fits the sink's free capacity, then waits
    /// for the next tick.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.poll);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tick.tick().await;

            loop {
                let free = self.sink.free_capacity();
                let Some(chunk) = self.queue.pull_fitting(free) else {
                    break;
                };
                if let Err(e) = self.sink.write(&chunk.data) {
                    warn!(error = %e, "audio sink write failed, chunk dropped");
                    break;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn chunk(marker: u8, len: usize) -> AudioChunk {
        AudioChunk {
            data: vec![marker; len],
        }
    }

    #[test]
    fn ceiling_keeps_most_recent_suffix() {
        let q = AudioPlaybackQueue::new(50_000, 1);
        // 10 chunks of 8 kB = 80 kB pushed; only the last 6 fit.
        for marker in 0..10u8 {
            q.push(chunk(marker, 8_000));
        }

        assert!(q.buffered_bytes() <= 50_000);
        assert_eq!(q.chunk_count(), 6);

        let mut markers = Vec::new();
        while let Some(c) = q.pull() {
            markers.push(c.data[0]);
        }
        assert_eq!(markers, vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(q.dropped_bytes(), 4 * 8_000);
    }

    #[test]
    fn ceiling_invariant_under_mixed_sizes() {
        let q = AudioPlaybackQueue::new(10_000, 1);
        for (i, len) in [3_000usize, 9_000, 500, 4_000, 7_000].into_iter().enumerate() {
            q.push(chunk(i as u8, len));
            assert!(q.buffered_bytes() <= 10_000);
        }
    }

    #[test]
    fn priming_withholds_until_depth() {
        let q = AudioPlaybackQueue::new(1_000_000, 8);
        for marker in 0..7u8 {
            q.push(chunk(marker, 100));
            assert!(q.pull().is_none(), "primed too early at chunk {marker}");
        }
        q.push(chunk(7, 100));
        assert!(q.is_primed());
        assert_eq!(q.pull().unwrap().data[0], 0);
    }

    #[test]
    fn priming_latches_until_clear() {
        let q = AudioPlaybackQueue::new(1_000_000, 2);
        q.push(chunk(0, 10));
        q.push(chunk(1, 10));
        while q.pull().is_some() {}

        // Drained to empty, but still primed: one push is pullable.
        q.push(chunk(2, 10));
        assert!(q.pull().is_some());

        q.clear();
        q.push(chunk(3, 10));
        assert!(q.pull().is_none());
    }

    #[test]
    fn clear_empties_and_rearms() {
        let q = AudioPlaybackQueue::new(1_000_000, 1);
        q.push(chunk(0, 500));
        assert!(q.is_primed());

        q.clear();
        assert_eq!(q.buffered_bytes(), 0);
        assert_eq!(q.chunk_count(), 0);
        assert!(!q.is_primed());
    }

    #[test]
    fn pull_fitting_respects_capacity() {
        let q = AudioPlaybackQueue::new(1_000_000, 1);
        q.push(chunk(0, 800));

        assert!(q.pull_fitting(799).is_none());
        assert_eq!(q.chunk_count(), 1);
        assert!(q.pull_fitting(800).is_some());
        assert_eq!(q.chunk_count(), 0);
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let q = AudioPlaybackQueue::new(1_000_000, 1);
        q.push(AudioChunk { data: Vec::new() });
        assert_eq!(q.chunk_count(), 0);
        assert!(!q.is_primed());
    }

    // A sink with a fixed budget that never refills, so capacity
    // violations are visible as over-long written totals.
    struct BudgetSink {
        written: Arc<StdMutex<Vec<u8>>>,
        budget: Arc<StdMutex<usize>>,
    }

    impl AudioSink for BudgetSink {
        fn free_capacity(&self) -> usize {
            *self.budget.lock().unwrap()
        }

        fn write(&mut self, pcm: &[u8]) -> std::io::Result<()> {
            let mut budget = self.budget.lock().unwrap();
            assert!(pcm.len() <= *budget, "wrote past reported capacity");
            *budget -= pcm.len();
            self.written.lock().unwrap().extend_from_slice(pcm);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pump_stops_at_sink_capacity() {
        let q = Arc::new(AudioPlaybackQueue::new(1_000_000, 1));
        q.push(chunk(0xAA, 600));
        q.push(chunk(0xBB, 600));

        let written = Arc::new(StdMutex::new(Vec::new()));
        let budget = Arc::new(StdMutex::new(1_000usize));
        let sink = BudgetSink {
            written: Arc::clone(&written),
            budget: Arc::clone(&budget),
        };

        let pump = AudioPump::new(Arc::clone(&q), Box::new(sink), Duration::from_millis(1));
        let stop = pump.stop_handle();
        let task = tokio::spawn(pump.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        task.abort();

        // First chunk fits the 1000-byte budget, second (600 > 400)
        // must stay queued.
        assert_eq!(written.lock().unwrap().len(), 600);
        assert_eq!(q.chunk_count(), 1);
    }
}
