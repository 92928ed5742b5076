//! Key combinations
//!
//! `cmd+shift+s` style combos: any number of modifiers and exactly one key.
//! Key codes are macOS virtual key codes (`kVK_*`).

use crate::errors::AxError;
use std::fmt;
use std::str::FromStr;

/// Modifier flag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const COMMAND: Self = Self(1 << 0);
    pub const SHIFT: Self = Self(1 << 1);
    pub const OPTION: Self = Self(1 << 2);
    pub const CONTROL: Self = Self(1 << 3);
    pub const FUNCTION: Self = Self(1 << 4);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::COMMAND, "cmd"),
        (Self::SHIFT, "shift"),
        (Self::OPTION, "opt"),
        (Self::CONTROL, "ctrl"),
        (Self::FUNCTION, "fn"),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Individual flags in a fixed order
    pub fn iter(self) -> impl Iterator<Item = Modifiers> {
        Self::NAMED
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |flag| self.contains(*flag))
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "cmd" | "command" | "meta" | "super" => Self::COMMAND,
            "shift" => Self::SHIFT,
            "opt" | "option" | "alt" => Self::OPTION,
            "ctrl" | "control" => Self::CONTROL,
            "fn" | "function" => Self::FUNCTION,
            _ => return None,
        })
    }
}

/// Virtual key code for a named key
pub fn key_code(name: &str) -> Option<u16> {
    Some(match name {
        // Letters
        "a" => 0x00,
        "s" => 0x01,
        "d" => 0x02,
        "f" => 0x03,
        "h" => 0x04,
        "g" => 0x05,
        "z" => 0x06,
        "x" => 0x07,
        "c" => 0x08,
        "v" => 0x09,
        "b" => 0x0B,
        "q" => 0x0C,
        "w" => 0x0D,
        "e" => 0x0E,
        "r" => 0x0F,
        "y" => 0x10,
        "t" => 0x11,
        "o" => 0x1F,
        "u" => 0x20,
        "i" => 0x22,
        "p" => 0x23,
        "l" => 0x25,
        "j" => 0x26,
        "k" => 0x28,
        "n" => 0x2D,
        "m" => 0x2E,

        // Digits
        "1" => 0x12,
        "2" => 0x13,
        "3" => 0x14,
        "4" => 0x15,
        "6" => 0x16,
        "5" => 0x17,
        "9" => 0x19,
        "7" => 0x1A,
        "8" => 0x1C,
        "0" => 0x1D,

        // Punctuation
        "=" | "equal" | "equals" => 0x18,
        "-" | "minus" => 0x1B,
        "]" | "rightbracket" => 0x1E,
        "[" | "leftbracket" => 0x21,
        "'" | "quote" => 0x27,
        ";" | "semicolon" => 0x29,
        "\\" | "backslash" => 0x2A,
        "," | "comma" => 0x2B,
        "/" | "slash" => 0x2C,
        "." | "period" => 0x2F,
        "`" | "grave" | "backtick" => 0x32,

        // Editing
        "return" | "enter" => 0x24,
        "tab" => 0x30,
        "space" => 0x31,
        "delete" | "backspace" => 0x33,
        "escape" | "esc" => 0x35,
        "forwarddelete" | "del" => 0x75,
        "help" => 0x72,

        // Navigation
        "home" => 0x73,
        "end" => 0x77,
        "pageup" | "pgup" => 0x74,
        "pagedown" | "pgdn" => 0x79,
        "left" => 0x7B,
        "right" => 0x7C,
        "down" => 0x7D,
        "up" => 0x7E,

        // Function keys
        "f1" => 0x7A,
        "f2" => 0x78,
        "f3" => 0x63,
        "f4" => 0x76,
        "f5" => 0x60,
        "f6" => 0x61,
        "f7" => 0x62,
        "f8" => 0x64,
        "f9" => 0x65,
        "f10" => 0x6D,
        "f11" => 0x67,
        "f12" => 0x6F,
        "f13" => 0x69,
        "f14" => 0x6B,
        "f15" => 0x71,
        "f16" => 0x6A,
        "f17" => 0x40,
        "f18" => 0x4F,
        "f19" => 0x50,
        "f20" => 0x5A,

        // Keypad
        "keypad0" => 0x52,
        "keypad1" => 0x53,
        "keypad2" => 0x54,
        "keypad3" => 0x55,
        "keypad4" => 0x56,
        "keypad5" => 0x57,
        "keypad6" => 0x58,
        "keypad7" => 0x59,
        "keypad8" => 0x5B,
        "keypad9" => 0x5C,
        "keypaddecimal" => 0x41,
        "keypadmultiply" => 0x43,
        "keypadplus" => 0x45,
        "keypadclear" => 0x47,
        "keypaddivide" => 0x4B,
        "keypadenter" => 0x4C,
        "keypadminus" => 0x4E,
        "keypadequals" => 0x51,

        // Media
        "volumeup" => 0x48,
        "volumedown" => 0x49,
        "mute" => 0x4A,

        _ => return None,
    })
}

/// Parsed key combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Modifiers,
    /// Normalized key name as found in the key table
    pub key: String,
    pub code: u16,
}

impl FromStr for KeyCombo {
    type Err = AxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Modifiers::NONE;
        let mut key: Option<(String, u16)> = None;

        for token in s.split('+') {
            let name = token.trim().to_lowercase();
            if name.is_empty() {
                return Err(AxError::invalid(format!("empty key in combination '{}'", s)));
            }
            if let Some(flag) = Modifiers::from_name(&name) {
                modifiers.insert(flag);
                continue;
            }
            if key.is_some() {
                return Err(AxError::invalid(format!(
                    "more than one non-modifier key in '{}'",
                    s
                )));
            }
            let code = key_code(&name).ok_or_else(|| AxError::invalid(format!("unknown key '{}'", token)))?;
            key = Some((name, code));
        }

        let (key, code) = key.ok_or_else(|| AxError::invalid(format!("no key in combination '{}'", s)))?;
        Ok(Self {
            modifiers,
            key,
            code,
        })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in Modifiers::NAMED {
            if self.modifiers.contains(flag) {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}
