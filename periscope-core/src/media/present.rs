//! Latest-frame-wins presentation.
//!
//! Decoded pictures overwrite a single slot; a display tick drains it
//! at the refresh cadence. If decode outpaces display, intermediate
//! pictures are simply never shown — the screen always jumps to the
//! newest state instead of replaying a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::media::types::DecodedPicture;

// ── RenderSink ───────────────────────────────────────────────────

/// Destination for fresh pictures.
///
/// `present` is called from the display tick task, never more than
/// once per published picture.
pub trait RenderSink: Send {
    fn present(&mut self, picture: &DecodedPicture);
}

// ── PresentationClock ────────────────────────────────────────────

struct Slot {
    latest: Option<Arc<DecodedPicture>>,
    displayed: bool,
}

/// Single-slot hand-off between the decode side and the display tick.
pub struct PresentationClock {
    slot: Mutex<Slot>,
}

impl Default for PresentationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationClock {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                displayed: true,
            }),
        }
    }

    /// Replace the slot with a newer picture and mark it fresh.
    /// Whatever was there before is dropped, displayed or not.
    pub fn publish(&self, picture: Arc<DecodedPicture>) {
        let mut slot = self.lock();
        slot.latest = Some(picture);
        slot.displayed = false;
    }

    /// Take the current picture if it has not been displayed yet.
    ///
    /// Returns `Some` at most once per published picture; repeat
    /// calls yield `None` until the next [`publish`](Self::publish).
    pub fn take_fresh(&self) -> Option<Arc<DecodedPicture>> {
        let mut slot = self.lock();
        if slot.displayed {
            return None;
        }
        slot.displayed = true;
        slot.latest.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ── Presenter ────────────────────────────────────────────────────

/// Display tick task: polls the clock and hands fresh pictures to the
/// [`RenderSink`].
pub struct Presenter {
    clock: Arc<PresentationClock>,
    sink: Box<dyn RenderSink>,
    tick: Duration,
    running: Arc<AtomicBool>,
}

impl Presenter {
    pub fn new(clock: Arc<PresentationClock>, sink: Box<dyn RenderSink>, tick: Duration) -> Self {
        Self {
            clock,
            sink,
            tick,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A cloneable handle that stops the tick loop from another task.
    /// Flipping it before [`run`](Self::run) is scheduled still wins.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the tick loop until the stop handle flips.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tick.tick().await;
            if let Some(picture) = self.clock.take_fresh() {
                trace!(
                    width = picture.width,
                    height = picture.height,
                    "presenting frame"
                );
                self.sink.present(&picture);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::Orientation;

    fn picture(marker: u8) -> Arc<DecodedPicture> {
        Arc::new(DecodedPicture {
            width: 2,
            height: 1,
            data: vec![marker; 6],
            orientation: Orientation::Deg0,
        })
    }

    #[test]
    fn fresh_picture_taken_exactly_once() {
        let clock = PresentationClock::new();
        clock.publish(picture(1));

        assert!(clock.take_fresh().is_some());
        assert!(clock.take_fresh().is_none());
        assert!(clock.take_fresh().is_none());
    }

    #[test]
    fn newer_publish_overwrites_undisplayed() {
        let clock = PresentationClock::new();
        clock.publish(picture(1));
        clock.publish(picture(2));

        let shown = clock.take_fresh().unwrap();
        assert_eq!(shown.data[0], 2);
        assert!(clock.take_fresh().is_none());
    }

    #[test]
    fn empty_clock_yields_nothing() {
        let clock = PresentationClock::new();
        assert!(clock.take_fresh().is_none());
    }

    #[test]
    fn republish_after_display_is_fresh_again() {
        let clock = PresentationClock::new();
        clock.publish(picture(1));
        assert!(clock.take_fresh().is_some());

        clock.publish(picture(2));
        assert_eq!(clock.take_fresh().unwrap().data[0], 2);
    }

    struct CountingSink {
        presented: Arc<Mutex<Vec<u8>>>,
    }

    impl RenderSink for CountingSink {
        fn present(&mut self, picture: &DecodedPicture) {
            self.presented.lock().unwrap().push(picture.data[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn presenter_shows_each_picture_once() {
        let clock = Arc::new(PresentationClock::new());
        let presented = Arc::new(Mutex::new(Vec::new()));
        let sink = CountingSink {
            presented: Arc::clone(&presented),
        };

        let presenter = Presenter::new(Arc::clone(&clock), Box::new(sink), Duration::from_millis(1));
        let stop = presenter.stop_handle();
        let task = tokio::spawn(presenter.run());

        clock.publish(picture(7));
        // Many ticks pass; the picture must be presented exactly once.
        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.publish(picture(8));
        tokio::time::sleep(Duration::from_millis(20)).await;

        stop.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        task.abort();

        assert_eq!(*presented.lock().unwrap(), vec![7, 8]);
    }
}
