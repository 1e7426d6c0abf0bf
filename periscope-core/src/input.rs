//! Outbound input: immediate keys, coalesced touch.
//!
//! The UI owns an [`InputChannel`] handle; the session owns the
//! matching [`InputReceiver`]. Key events queue immediately. Touch
//! events overwrite a single pending slot that the session flushes on
//! a fixed cadence, so a flood of move events between two flushes
//! collapses into the newest sample instead of a backlog the remote
//! replays late. Input is lossy by design: when the session cannot
//! take an event right now, dropping it is better than queueing it.
//!
//! Touch coordinates arrive in local display space and are mapped to
//! remote screen space with the current [`ViewGeometry`] before they
//! enter the slot.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::event::{InputEvent, TouchEvent, TouchKind};

/// Queued key events. Small on purpose: keys are sent as fast as the
/// socket takes them, and a deeper queue would only add latency.
const KEY_QUEUE_DEPTH: usize = 64;

// ── ViewGeometry ─────────────────────────────────────────────────

/// Relation between the local rendering of the stream and the remote
/// screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewGeometry {
    /// Size of the rendered picture on the local display.
    pub render_width: u32,
    pub render_height: u32,
    /// Dimensions of the decoded stream.
    pub source_width: u32,
    pub source_height: u32,
}

impl ViewGeometry {
    /// Map a local point into remote screen space.
    ///
    /// Negative coordinates clamp to 0, oversized ones saturate at
    /// `u16::MAX`. Returns `None` until both sizes are known.
    pub fn map_point(&self, x: f32, y: f32) -> Option<(u16, u16)> {
        if self.render_width == 0
            || self.render_height == 0
            || self.source_width == 0
            || self.source_height == 0
        {
            return None;
        }
        let rx = x.max(0.0) * self.source_width as f32 / self.render_width as f32;
        let ry = y.max(0.0) * self.source_height as f32 / self.render_height as f32;
        Some((
            rx.min(u16::MAX as f32) as u16,
            ry.min(u16::MAX as f32) as u16,
        ))
    }
}

// ── Shared state ─────────────────────────────────────────────────

struct InputShared {
    pending_touch: Mutex<Option<TouchEvent>>,
    geometry: Mutex<ViewGeometry>,
}

impl InputShared {
    fn lock_touch(&self) -> std::sync::MutexGuard<'_, Option<TouchEvent>> {
        match self.pending_touch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_geometry(&self) -> std::sync::MutexGuard<'_, ViewGeometry> {
        match self.geometry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Create a connected channel/receiver pair.
pub fn input_pair() -> (InputChannel, InputReceiver) {
    let (events_tx, events_rx) = mpsc::channel(KEY_QUEUE_DEPTH);
    let shared = Arc::new(InputShared {
        pending_touch: Mutex::new(None),
        geometry: Mutex::new(ViewGeometry::default()),
    });
    (
        InputChannel {
            events: events_tx,
            shared: Arc::clone(&shared),
        },
        InputReceiver {
            events: events_rx,
            state: InputState { shared },
        },
    )
}

// ── InputState ───────────────────────────────────────────────────

/// Cloneable view of the touch slot and the geometry mapper. Lets a
/// select loop flush touches and feed back stream dimensions while
/// the event receiver itself is mutably borrowed by another arm.
#[derive(Clone)]
pub struct InputState {
    shared: Arc<InputShared>,
}

impl InputState {
    /// Take the pending touch sample, leaving the slot empty.
    pub fn take_pending_touch(&self) -> Option<TouchEvent> {
        self.shared.lock_touch().take()
    }

    /// Record the decoded stream dimensions for coordinate mapping.
    pub fn update_source_dims(&self, width: u32, height: u32) {
        let mut geometry = self.shared.lock_geometry();
        geometry.source_width = width;
        geometry.source_height = height;
    }
}

// ── InputChannel ─────────────────────────────────────────────────

/// UI-side input handle. Cheap to clone; valid across reconnects.
#[derive(Clone)]
pub struct InputChannel {
    events: mpsc::Sender<InputEvent>,
    shared: Arc<InputShared>,
}

impl InputChannel {
    /// Queue a key press/release for immediate sending.
    pub fn send_key(&self, down: bool, code: u32) {
        let event = InputEvent::Key { down, code };
        if self.events.try_send(event).is_err() {
            debug!(code, "key event dropped, session not draining");
        }
    }

    /// Record a touch sample at a local display position. Replaces
    /// whatever sample is already waiting for the next flush.
    pub fn send_touch(&self, kind: TouchKind, finger: u8, x: f32, y: f32) {
        let Some((rx, ry)) = self.shared.lock_geometry().map_point(x, y) else {
            debug!("touch dropped, view geometry not known yet");
            return;
        };
        *self.shared.lock_touch() = Some(TouchEvent {
            kind,
            finger,
            x: rx,
            y: ry,
        });
    }

    /// Tell the mapper how large the picture is being rendered.
    /// Call on every resize.
    pub fn set_render_size(&self, width: u32, height: u32) {
        let mut geometry = self.shared.lock_geometry();
        geometry.render_width = width;
        geometry.render_height = height;
    }

    /// Current mapping state, for UI-side hit testing.
    pub fn geometry(&self) -> ViewGeometry {
        *self.shared.lock_geometry()
    }
}

// ── InputReceiver ────────────────────────────────────────────────

/// Session-side half: drains key events, flushes the touch slot,
/// feeds decoded dimensions back into the mapper.
pub struct InputReceiver {
    events: mpsc::Receiver<InputEvent>,
    state: InputState,
}

impl InputReceiver {
    /// Wait for the next queued event.
    pub async fn recv(&mut self) -> Option<InputEvent> {
        self.events.recv().await
    }

    /// Shared-state handle, cloneable independently of the receiver.
    pub fn state(&self) -> InputState {
        self.state.clone()
    }

    /// Take the pending touch sample, leaving the slot empty.
    pub fn take_pending_touch(&self) -> Option<TouchEvent> {
        self.state.take_pending_touch()
    }

    /// Record the decoded stream dimensions for coordinate mapping.
    pub fn update_source_dims(&self, width: u32, height: u32) {
        self.state.update_source_dims(width, height);
    }

    /// Drop everything queued before a reconnect: events meant for
    /// the old connection must not replay into the new one.
    pub fn clear_stale(&mut self) {
        *self.state.shared.lock_touch() = None;
        while self.events.try_recv().is_ok() {}
    }
}

// ── Tests ────────────────────────────────────────────────────────
