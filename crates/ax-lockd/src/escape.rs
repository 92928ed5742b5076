//! Triple-escape detection

use crate::constants::{ESCAPE_PRESS_COUNT, ESCAPE_WINDOW_MS};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Counts escape presses inside a sliding window
///
/// Reaching the threshold clears the history, so a press right after a
/// trigger starts a fresh count.
#[derive(Debug)]
pub struct EscapeDetector {
    window: Duration,
    presses: usize,
    history: VecDeque<Instant>,
}

impl EscapeDetector {
    pub fn new(window: Duration, presses: usize) -> Self {
        Self {
            window,
            presses,
            history: VecDeque::with_capacity(presses),
        }
    }

    /// Record a press at `at`; true exactly when this press completes the sequence
    pub fn record(&mut self, at: Instant) -> bool {
        while let Some(&oldest) = self.history.front() {
            if at.saturating_duration_since(oldest) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        self.history.push_back(at);
        if self.history.len() >= self.presses {
            self.history.clear();
            return true;
        }
        false
    }

    pub fn pending(&self) -> usize {
        self.history.len()
    }
}

impl Default for EscapeDetector {
    fn default() -> Self {
        Self::new(Duration::from_millis(ESCAPE_WINDOW_MS), ESCAPE_PRESS_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn test_three_presses_within_window_fire_once() {
        let base = Instant::now();
        let mut detector = EscapeDetector::default();

        assert!(!detector.record(ms(base, 0)));
        assert!(!detector.record(ms(base, 300)));
        assert!(detector.record(ms(base, 900)));
        // 事後条件: 発火後は履歴が空
        assert_eq!(detector.pending(), 0);
    }

    #[test]
    fn test_presses_spanning_more_than_window_never_fire() {
        let base = Instant::now();
        let mut detector = EscapeDetector::default();

        assert!(!detector.record(ms(base, 0)));
        assert!(!detector.record(ms(base, 600)));
        assert!(!detector.record(ms(base, 1200)));
        assert!(!detector.record(ms(base, 1900)));
        assert_eq!(detector.pending(), 2);
    }

    #[test]
    fn test_press_after_trigger_starts_fresh_count() {
        let base = Instant::now();
        let mut detector = EscapeDetector::default();

        detector.record(ms(base, 0));
        detector.record(ms(base, 100));
        assert!(detector.record(ms(base, 200)));

        assert!(!detector.record(ms(base, 250)));
        assert_eq!(detector.pending(), 1);
        assert!(!detector.record(ms(base, 300)));
        assert!(detector.record(ms(base, 350)));
    }

    #[test]
    fn test_press_exactly_at_window_edge_still_counts() {
        let base = Instant::now();
        let mut detector = EscapeDetector::new(Duration::from_millis(1000), 3);

        detector.record(ms(base, 0));
        detector.record(ms(base, 500));
        assert!(detector.record(ms(base, 1000)));
    }
}
