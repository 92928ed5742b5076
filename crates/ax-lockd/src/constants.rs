//! Tunables for the suppression process

/// macOS virtual key code of the Escape key
pub const ESCAPE_KEY_CODE: u16 = 0x35;

/// Sliding window in which the escape presses must land
pub const ESCAPE_WINDOW_MS: u64 = 1000;

/// Escape presses within the window that release the lock
pub const ESCAPE_PRESS_COUNT: usize = 3;

/// Upper bound on the lock timeout, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// How long a connected sender gets to deliver its notification
pub const RECEIVE_TIMEOUT_MS: u64 = 500;

/// Text shown on the overlay until the first command arrives
pub const IDLE_MESSAGE: &str = "Input is locked while ax is working. Press Escape three times to take back control.";

/// How long `show` waits for the overlay host to report its window
pub const OVERLAY_REPLY_TIMEOUT_MS: u64 = 2000;

/// Run loop slice between checks for overlay commands or a stop request
pub const RUN_LOOP_SLICE_MS: u64 = 50;
