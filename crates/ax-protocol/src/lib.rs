//! Common protocol definitions for ax
//!
//! This crate defines the types shared between the `ax` command line tool and
//! the `axlockd` input suppression process: screen geometry, the sentinel
//! marker carried by synthetic input, the well-known paths both sides agree
//! on, and the best-effort command notification channel.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Marker stored in the event source user data of every synthetic event.
///
/// Reads as the ASCII tag `AXCLI`; hardware never fills this field with it.
pub const SENTINEL_MARKER: i64 = 0x41_58_43_4C_49;

/// Maximum size of a single notification, newline included
pub const MAX_NOTIFICATION_SIZE: usize = 4096;

/// Default socket path for the command notification channel
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());
    runtime_dir.join("axlockd.sock")
}

/// Default location of the lock state record (PID of the running suppressor)
pub fn default_lock_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".ax")
        .join("lockd.pid")
}

/// A point in global screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by a signed offset
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// A width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether `point` lies inside (right and bottom edges exclusive)
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }

    /// Whether the two rectangles share any area
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Messages accepted by the suppressor's notification listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    /// A command that was just executed while the lock is held
    Command {
        command: String,
        description: String,
    },
}

impl Notification {
    pub fn command(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Write one newline-terminated notification
pub async fn write_notification<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    notification: &Notification,
) -> Result<(), ProtocolError> {
    let mut data = serde_json::to_vec(notification)?;
    data.push(b'\n');
    if data.len() > MAX_NOTIFICATION_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }

    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one notification, stopping at the first newline or end of stream
///
/// Never buffers more than [`MAX_NOTIFICATION_SIZE`] bytes.
pub async fn read_notification<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Notification, ProtocolError> {
    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];

    let line_end = loop {
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            break pos;
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Err(ProtocolError::ConnectionClosed);
            }
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_NOTIFICATION_SIZE {
            return Err(ProtocolError::MessageTooLarge(buf.len()));
        }
    };

    let notification = serde_json::from_slice(&buf[..line_end])?;
    Ok(notification)
}
