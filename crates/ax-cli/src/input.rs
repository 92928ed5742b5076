//! Synthetic mouse and keyboard input
//!
//! Every event posted through [`EnigoSink`] carries [`SENTINEL_MARKER`] in its
//! event source data, which is how `axlockd` tells our input from the user's.

use crate::constants::{DOUBLE_CLICK_GAP_MS, KEY_REPEAT_DELAY_MS};
use crate::errors::AxError;
use crate::keys::{KeyCombo, Modifiers};
use ax_protocol::{Point, SENTINEL_MARKER};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use serde::Serialize;
use std::thread;
use std::time::Duration;

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Center,
}

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Down,
    Up,
}

/// Destination for synthetic input events
pub trait InputSink {
    fn move_to(&mut self, point: Point) -> Result<(), AxError>;

    /// `click_count` is 2 for the second pair of a double click
    fn button(&mut self, button: MouseButton, press: Press, click_count: u32) -> Result<(), AxError>;

    /// Pointer moved to `point` with `button` held
    fn drag_to(&mut self, point: Point, button: MouseButton) -> Result<(), AxError>;

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), AxError>;

    /// Inject Unicode text, independent of keyboard layout
    fn text(&mut self, text: &str) -> Result<(), AxError>;

    /// Press and release one key with modifiers held
    fn key(&mut self, combo: &KeyCombo) -> Result<(), AxError>;
}

pub fn click(sink: &mut dyn InputSink, at: Point, button: MouseButton) -> Result<(), AxError> {
    sink.move_to(at)?;
    sink.button(button, Press::Down, 1)?;
    sink.button(button, Press::Up, 1)
}

pub fn double_click(sink: &mut dyn InputSink, at: Point, button: MouseButton) -> Result<(), AxError> {
    click(sink, at, button)?;
    thread::sleep(Duration::from_millis(DOUBLE_CLICK_GAP_MS));
    sink.button(button, Press::Down, 2)?;
    sink.button(button, Press::Up, 2)
}

/// Press at `from`, one dragged event at `to`, release at `to`
pub fn drag(sink: &mut dyn InputSink, from: Point, to: Point, button: MouseButton) -> Result<(), AxError> {
    sink.move_to(from)?;
    sink.button(button, Press::Down, 1)?;
    sink.drag_to(to, button)?;
    sink.button(button, Press::Up, 1)
}

pub fn scroll(sink: &mut dyn InputSink, at: Point, dx: i32, dy: i32) -> Result<(), AxError> {
    sink.move_to(at)?;
    sink.scroll(dx, dy)
}

pub fn type_text(sink: &mut dyn InputSink, text: &str) -> Result<(), AxError> {
    sink.text(text)
}

/// Send `combo` `repeat` times with a short pause between presses
pub fn press_key(sink: &mut dyn InputSink, combo: &KeyCombo, repeat: u32) -> Result<(), AxError> {
    for i in 0..repeat {
        if i > 0 {
            thread::sleep(Duration::from_millis(KEY_REPEAT_DELAY_MS));
        }
        sink.key(combo)?;
    }
    Ok(())
}

fn input_failed(what: &str, err: impl std::fmt::Display) -> AxError {
    AxError::action_failed(format!("failed to {}: {}", what, err))
}

/// Input sink posting real events through enigo
pub struct EnigoSink {
    enigo: Enigo,
}

impl EnigoSink {
    pub fn new() -> Result<Self, AxError> {
        let settings = Settings {
            event_source_user_data: Some(SENTINEL_MARKER),
            windows_dw_extra_info: Some(SENTINEL_MARKER as usize),
            ..Default::default()
        };
        let enigo = Enigo::new(&settings).map_err(|e| {
            AxError::PermissionDenied(format!("cannot create input event source: {}", e))
        })?;
        Ok(Self { enigo })
    }

    fn modifier_keys(modifiers: Modifiers) -> Vec<Key> {
        modifiers
            .iter()
            .filter_map(|flag| match flag {
                Modifiers::COMMAND => Some(Key::Meta),
                Modifiers::SHIFT => Some(Key::Shift),
                Modifiers::OPTION => Some(Key::Alt),
                Modifiers::CONTROL => Some(Key::Control),
                #[cfg(target_os = "macos")]
                Modifiers::FUNCTION => Some(Key::Function),
                _ => None,
            })
            .collect()
    }

    #[cfg(target_os = "macos")]
    fn tap(&mut self, combo: &KeyCombo) -> Result<(), AxError> {
        self.enigo
            .raw(combo.code, Direction::Click)
            .map_err(|e| input_failed("press key", e))
    }

    /// Virtual key codes are macOS codes; elsewhere go through the key name
    #[cfg(not(target_os = "macos"))]
    fn tap(&mut self, combo: &KeyCombo) -> Result<(), AxError> {
        let key = named_key(&combo.key)
            .ok_or_else(|| AxError::action_failed(format!("key '{}' is not available on this platform", combo.key)))?;
        self.enigo
            .key(key, Direction::Click)
            .map_err(|e| input_failed("press key", e))
    }
}

#[cfg(not(target_os = "macos"))]
fn named_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(Key::Unicode(c));
    }
    Some(match name {
        "return" | "enter" | "keypadenter" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "delete" | "backspace" => Key::Backspace,
        "forwarddelete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "volumeup" => Key::VolumeUp,
        "volumedown" => Key::VolumeDown,
        "mute" => Key::VolumeMute,
        _ => return None,
    })
}

impl MouseButton {
    fn to_enigo(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Center => Button::Middle,
        }
    }
}

fn screen_coords(point: Point) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

impl InputSink for EnigoSink {
    fn move_to(&mut self, point: Point) -> Result<(), AxError> {
        let (x, y) = screen_coords(point);
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| input_failed("move mouse", e))
    }

    // enigo has no click-state parameter. It counts presses itself and marks the
    // second one as a double click when it lands inside the system double-click
    // interval, which DOUBLE_CLICK_GAP_MS stays well below.
    fn button(&mut self, button: MouseButton, press: Press, _click_count: u32) -> Result<(), AxError> {
        let direction = match press {
            Press::Down => Direction::Press,
            Press::Up => Direction::Release,
        };
        self.enigo
            .button(button.to_enigo(), direction)
            .map_err(|e| input_failed("press mouse button", e))
    }

    // A move while a button is held is posted by enigo as that button's dragged event
    fn drag_to(&mut self, point: Point, _button: MouseButton) -> Result<(), AxError> {
        self.move_to(point)
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), AxError> {
        if dx != 0 {
            self.enigo
                .scroll(dx, Axis::Horizontal)
                .map_err(|e| input_failed("scroll horizontally", e))?;
        }
        if dy != 0 {
            self.enigo
                .scroll(dy, Axis::Vertical)
                .map_err(|e| input_failed("scroll vertically", e))?;
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), AxError> {
        self.enigo.text(text).map_err(|e| input_failed("type text", e))
    }

    fn key(&mut self, combo: &KeyCombo) -> Result<(), AxError> {
        let modifiers = Self::modifier_keys(combo.modifiers);
        for key in &modifiers {
            self.enigo
                .key(*key, Direction::Press)
                .map_err(|e| input_failed("press modifier", e))?;
        }

        let result = self.tap(combo);

        // Modifiers are released even when the key itself failed
        for key in modifiers.iter().rev() {
            if let Err(e) = self.enigo.key(*key, Direction::Release) {
                tracing::warn!("failed to release modifier {:?}: {}", key, e);
            }
        }
        result
    }
}

/// Opens the enigo sink on first use, so read-only commands never need an input connection
#[derive(Default)]
pub struct DeferredSink {
    inner: Option<EnigoSink>,
}

impl DeferredSink {
    fn sink(&mut self) -> Result<&mut EnigoSink, AxError> {
        if self.inner.is_none() {
            self.inner = Some(EnigoSink::new()?);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| AxError::action_failed("input event source unavailable"))
    }
}

impl InputSink for DeferredSink {
    fn move_to(&mut self, point: Point) -> Result<(), AxError> {
        self.sink()?.move_to(point)
    }

    fn button(&mut self, button: MouseButton, press: Press, click_count: u32) -> Result<(), AxError> {
        self.sink()?.button(button, press, click_count)
    }

    fn drag_to(&mut self, point: Point, button: MouseButton) -> Result<(), AxError> {
        self.sink()?.drag_to(point, button)
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), AxError> {
        self.sink()?.scroll(dx, dy)
    }

    fn text(&mut self, text: &str) -> Result<(), AxError> {
        self.sink()?.text(text)
    }

    fn key(&mut self, combo: &KeyCombo) -> Result<(), AxError> {
        self.sink()?.key(combo)
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    /// Events captured by [`RecordingSink`]
    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Move(Point),
        Button(MouseButton, Press, u32),
        Drag(Point, MouseButton),
        Scroll(i32, i32),
        Text(String),
        Key(String),
    }

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub events: Vec<Recorded>,
    }

    impl InputSink for RecordingSink {
        fn move_to(&mut self, point: Point) -> Result<(), AxError> {
            self.events.push(Recorded::Move(point));
            Ok(())
        }

        fn button(&mut self, button: MouseButton, press: Press, click_count: u32) -> Result<(), AxError> {
            self.events.push(Recorded::Button(button, press, click_count));
            Ok(())
        }

        fn drag_to(&mut self, point: Point, button: MouseButton) -> Result<(), AxError> {
            self.events.push(Recorded::Drag(point, button));
            Ok(())
        }

        fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), AxError> {
            self.events.push(Recorded::Scroll(dx, dy));
            Ok(())
        }

        fn text(&mut self, text: &str) -> Result<(), AxError> {
            self.events.push(Recorded::Text(text.to_string()));
            Ok(())
        }

        fn key(&mut self, combo: &KeyCombo) -> Result<(), AxError> {
            self.events.push(Recorded::Key(combo.to_string()));
            Ok(())
        }
    }
}
