//! On-screen lock indicator seam

use crate::constants::OVERLAY_REPLY_TIMEOUT_MS;
use parking_lot::Mutex;
use std::sync::{Arc, mpsc};
use std::time::Duration;

pub type SharedOverlay = Arc<Mutex<Box<dyn Overlay>>>;

/// Indicator shown on every display while input is locked
pub trait Overlay: Send {
    fn show(&mut self, message: &str);

    /// Replace the status line with what ax just did
    fn set_status(&mut self, status: &str);

    fn close(&mut self);

    /// Native window number handed back to `ax`; `None` when nothing is drawn
    fn handle(&self) -> Option<u64>;
}

pub fn shared(overlay: Box<dyn Overlay>) -> SharedOverlay {
    Arc::new(Mutex::new(overlay))
}

/// Overlay that reports its state through the log, for builds without a display
#[derive(Debug, Default)]
pub struct LogOverlay {
    open: bool,
}

impl LogOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Overlay for LogOverlay {
    fn show(&mut self, message: &str) {
        self.open = true;
        tracing::info!("{}", message);
    }

    fn set_status(&mut self, status: &str) {
        if self.open {
            tracing::info!("status: {}", status);
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            tracing::info!("overlay closed");
        }
    }

    fn handle(&self) -> Option<u64> {
        None
    }
}

/// Request for the thread that owns the overlay windows
#[derive(Debug)]
pub enum OverlayCommand {
    /// Open the windows; the reply carries the first window's number
    Show {
        message: String,
        reply: mpsc::SyncSender<Option<u64>>,
    },
    Status(String),
    Close,
}

/// Overlay whose windows live on another thread
///
/// AppKit only draws from the main thread, so the daemon holds this end and
/// the main thread serves the receiver returned by [`remote`].
pub struct RemoteOverlay {
    commands: mpsc::Sender<OverlayCommand>,
    handle: Option<u64>,
    reply_timeout: Duration,
}

pub fn remote() -> (RemoteOverlay, mpsc::Receiver<OverlayCommand>) {
    let (commands, receiver) = mpsc::channel();
    let overlay = RemoteOverlay {
        commands,
        handle: None,
        reply_timeout: Duration::from_millis(OVERLAY_REPLY_TIMEOUT_MS),
    };
    (overlay, receiver)
}

impl Overlay for RemoteOverlay {
    fn show(&mut self, message: &str) {
        let (reply, answer) = mpsc::sync_channel(1);
        let request = OverlayCommand::Show {
            message: message.to_string(),
            reply,
        };
        if self.commands.send(request).is_err() {
            tracing::warn!("overlay host is gone, locking without an indicator");
            return;
        }

        match answer.recv_timeout(self.reply_timeout) {
            Ok(handle) => self.handle = handle,
            Err(e) => tracing::warn!("overlay did not report a window: {}", e),
        }
    }

    fn set_status(&mut self, status: &str) {
        let _ = self.commands.send(OverlayCommand::Status(status.to_string()));
    }

    fn close(&mut self) {
        let _ = self.commands.send(OverlayCommand::Close);
    }

    fn handle(&self) -> Option<u64> {
        self.handle
    }
}
