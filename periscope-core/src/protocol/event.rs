//! Outbound input records.
//!
//! Uses proper enums with `TryFrom`, no panics on unknown values.
//!
//! Record layouts (input protocol version 1):
//!
//! ```text
//! keyboard:  0x00  down:u8  key_code:u32 BE          (6 bytes)
//! touch:     0x01  kind:u8  finger:u8  x:u16 BE  y:u16 BE  (7 bytes)
//! ```
//!
//! Coordinates are remote screen space; the engine maps from local
//! display space before an event reaches this module.

use bytes::{BufMut, BytesMut};

use crate::error::ScreenError;

// ── Constants ────────────────────────────────────────────────────

/// Version of the input record format. Informational only; it is not
/// sent on the wire.
pub const INPUT_PROTOCOL_VERSION: u8 = 1;

/// Record tag for keyboard events.
pub const EVENT_KEYBOARD: u8 = 0x00;

/// Record tag for touch events.
pub const EVENT_TOUCH: u8 = 0x01;

// ── TouchKind ────────────────────────────────────────────────────

/// What a touch record reports the finger doing.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchKind {
    Up = 0,
    Down = 1,
    Move = 2,
}

impl TryFrom<u8> for TouchKind {
    type Error = ScreenError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TouchKind::Up),
            1 => Ok(TouchKind::Down),
            2 => Ok(TouchKind::Move),
            _ => Err(ScreenError::UnknownVariant {
                type_name: "TouchKind",
                value: value as u64,
            }),
        }
    }
}

// ── TouchEvent ───────────────────────────────────────────────────

/// A single touch record, already in remote coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: TouchKind,
    pub finger: u8,
    pub x: u16,
    pub y: u16,
}

// ── InputEvent ───────────────────────────────────────────────────

/// Any record the client can send upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key went down (`down == true`) or up.
    Key { down: bool, code: u32 },
    /// A coalesced touch sample.
    Touch(TouchEvent),
}

impl InputEvent {
    /// Encoded size on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Key { .. } => 6,
            Self::Touch(_) => 7,
        }
    }

    /// Append the record's wire bytes to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        match *self {
            Self::Key { down, code } => {
                dst.put_u8(EVENT_KEYBOARD);
                dst.put_u8(down as u8);
                dst.put_u32(code);
            }
            Self::Touch(t) => {
                dst.put_u8(EVENT_TOUCH);
                dst.put_u8(t.kind as u8);
                dst.put_u8(t.finger);
                dst.put_u16(t.x);
                dst.put_u16(t.y);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_record_layout() {
        let mut buf = BytesMut::new();
        InputEvent::Key {
            down: true,
            code: 0x0001_0203,
        }
        .encode_into(&mut buf);

        assert_eq!(&buf[..], &[0x00, 0x01, 0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn keyboard_release_layout() {
        let mut buf = BytesMut::new();
        InputEvent::Key {
            down: false,
            code: 65,
        }
        .encode_into(&mut buf);

        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x00, 0x00, 65]);
    }

    #[test]
    fn touch_record_layout() {
        let mut buf = BytesMut::new();
        InputEvent::Touch(TouchEvent {
            kind: TouchKind::Move,
            finger: 0,
            x: 0x1234,
            y: 0x0056,
        })
        .encode_into(&mut buf);

        assert_eq!(&buf[..], &[0x01, 0x02, 0x00, 0x12, 0x34, 0x00, 0x56]);
    }

    #[test]
    fn encoded_len_matches_bytes_written() {
        let events = [
            InputEvent::Key {
                down: true,
                code: 1,
            },
            InputEvent::Touch(TouchEvent {
                kind: TouchKind::Down,
                finger: 1,
                x: 10,
                y: 20,
            }),
        ];
        for ev in events {
            let mut buf = BytesMut::new();
            ev.encode_into(&mut buf);
            assert_eq!(buf.len(), ev.encoded_len());
        }
    }

    #[test]
    fn touch_kind_from_u8() {
        assert_eq!(TouchKind::try_from(0).unwrap(), TouchKind::Up);
        assert_eq!(TouchKind::try_from(1).unwrap(), TouchKind::Down);
        assert_eq!(TouchKind::try_from(2).unwrap(), TouchKind::Move);
        assert!(TouchKind::try_from(3).is_err());
    }
}
