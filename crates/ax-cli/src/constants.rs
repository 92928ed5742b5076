//! Constants used throughout the CLI
//!
//! This module centralizes magic numbers for better maintainability.

/// Depth limit when searching a process tree for a content hash
pub const MAX_LOOKUP_DEPTH: usize = 50;

/// Depth limit below each window when collecting elements inside a rect
pub const REGION_SEARCH_DEPTH: usize = 10;

/// Text values longer than this many characters are truncated
pub const MAX_VALUE_CHARS: usize = 500;

/// Suffix appended to truncated text values
pub const TRUNCATION_MARKER: &str = "...";

/// Lock timeout used when none is requested, in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

/// Upper bound on any lock timeout, in seconds
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 300;

/// Time the suppressor gets to install its hook before we check on it
pub const LOCK_SETTLE_DELAY_MS: u64 = 500;

/// Number of polls for the overlay handle after the settle delay
pub const HANDOFF_POLL_ATTEMPTS: u32 = 30;

/// Interval between handoff polls in milliseconds
pub const HANDOFF_POLL_INTERVAL_MS: u64 = 50;

/// Number of polls while waiting for the suppressor to exit on unlock
pub const UNLOCK_POLL_ATTEMPTS: u32 = 10;

/// Interval between unlock polls in milliseconds
pub const UNLOCK_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound on connecting to and writing a notification
pub const NOTIFY_TIMEOUT_MS: u64 = 100;

/// Pause between repeated key presses
pub const KEY_REPEAT_DELAY_MS: u64 = 30;

/// Pause between the two clicks of a double click
pub const DOUBLE_CLICK_GAP_MS: u64 = 50;
