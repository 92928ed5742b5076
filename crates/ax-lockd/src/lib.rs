//! Input suppression process for ax
//!
//! While running, every human pointer and keyboard event is discarded and
//! only events carrying [`ax_protocol::SENTINEL_MARKER`] reach applications.
//! The lock ends on its timeout, on three Escape presses within a second,
//! or on SIGTERM/SIGINT.

pub mod constants;
pub mod daemon;
pub mod escape;
pub mod filter;
pub mod hook;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod overlay;
pub mod server;

pub use daemon::{Daemon, DaemonConfig, ExitReason, LockdError, Phase};
pub use escape::EscapeDetector;
pub use filter::{EventFilter, EventKind, InputEvent, Verdict, quartz_event_mask};
pub use hook::{HookError, InputInterceptor, UnsupportedInterceptor, platform_interceptor};
pub use overlay::{LogOverlay, Overlay, OverlayCommand, RemoteOverlay};
pub use server::NotificationServer;
