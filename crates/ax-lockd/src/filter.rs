//! Forward-or-discard decision for intercepted input

use crate::constants::ESCAPE_KEY_CODE;
use crate::escape::EscapeDetector;
use ax_protocol::SENTINEL_MARKER;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

/// Kinds of input the hook intercepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    FlagsChanged,
    MouseDown,
    MouseUp,
    MouseMoved,
    MouseDragged,
    Scroll,
}

/// An intercepted event, reduced to what the filter looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Event source user data; synthetic ax input carries the sentinel here
    pub source_user_data: i64,
    pub keycode: Option<u16>,
}

impl InputEvent {
    pub fn human(kind: EventKind) -> Self {
        Self {
            kind,
            source_user_data: 0,
            keycode: None,
        }
    }

    pub fn key_down(keycode: u16) -> Self {
        Self {
            kind: EventKind::KeyDown,
            source_user_data: 0,
            keycode: Some(keycode),
        }
    }

    pub fn synthetic(kind: EventKind) -> Self {
        Self {
            kind,
            source_user_data: SENTINEL_MARKER,
            keycode: None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source_user_data == SENTINEL_MARKER
    }

    /// Translate a Quartz event; `None` for types the tap does not filter
    pub fn from_quartz(event_type: u32, source_user_data: i64, keycode: i64) -> Option<Self> {
        let kind = quartz_kind(event_type)?;
        let keycode = matches!(kind, EventKind::KeyDown | EventKind::KeyUp).then_some(keycode as u16);
        Some(Self {
            kind,
            source_user_data,
            keycode,
        })
    }
}

/// Quartz `CGEventType` values the event tap subscribes to
pub const QUARTZ_TAPPED_TYPES: [u32; 14] = [1, 2, 3, 4, 5, 6, 7, 10, 11, 12, 22, 25, 26, 27];

fn quartz_kind(event_type: u32) -> Option<EventKind> {
    Some(match event_type {
        1 | 3 | 25 => EventKind::MouseDown,
        2 | 4 | 26 => EventKind::MouseUp,
        5 => EventKind::MouseMoved,
        6 | 7 | 27 => EventKind::MouseDragged,
        10 => EventKind::KeyDown,
        11 => EventKind::KeyUp,
        12 => EventKind::FlagsChanged,
        22 => EventKind::Scroll,
        _ => return None,
    })
}

/// `CGEventMask` covering [`QUARTZ_TAPPED_TYPES`]
pub fn quartz_event_mask() -> u64 {
    QUARTZ_TAPPED_TYPES.iter().fold(0, |mask, t| mask | (1u64 << t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Discard,
}

/// Lets sentinel-marked events through, drops everything else, and watches
/// the dropped keys for the escape sequence
pub struct EventFilter {
    escape: EscapeDetector,
    on_escape: Arc<Notify>,
}

impl EventFilter {
    pub fn new(on_escape: Arc<Notify>) -> Self {
        Self {
            escape: EscapeDetector::default(),
            on_escape,
        }
    }

    pub fn decide(&mut self, event: &InputEvent, now: Instant) -> Verdict {
        if event.is_synthetic() {
            return Verdict::Forward;
        }

        if event.kind == EventKind::KeyDown
            && event.keycode == Some(ESCAPE_KEY_CODE)
            && self.escape.record(now)
        {
            tracing::info!("escape sequence detected");
            self.on_escape.notify_one();
        }
        Verdict::Discard
    }
}
