//! Log flood control.
//!
//! [`WarnThrottle`] lets one warning through per window and counts the rest;
//! [`OnceLog`] lets each distinct message through exactly once.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// One warning per window.
#[derive(Debug)]
pub struct WarnThrottle {
    window: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_emit: Option<Instant>,
    suppressed: u64,
}

impl WarnThrottle {
    /// Lets the first warning of every `window` through.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Returns `Some(suppressed)` when the caller should log now, where
    /// `suppressed` is the number of occurrences swallowed since the last
    /// emitted warning. Returns `None` inside the window.
    pub fn check(&self) -> Option<u64> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let due = state
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if due {
            state.last_emit = Some(now);
            Some(std::mem::take(&mut state.suppressed))
        } else {
            state.suppressed += 1;
            None
        }
    }
}

/// Lets each distinct key through once.
#[derive(Debug, Default)]
pub struct OnceLog {
    seen: Mutex<HashSet<String>>,
}

impl OnceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time `key` is seen.
    pub fn first(&self, key: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(key) {
            false
        } else {
            seen.insert(key.to_string());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_counts_suppressed() {
        let throttle = WarnThrottle::new(Duration::from_secs(10));
        assert_eq!(throttle.check(), Some(0));
        assert_eq!(throttle.check(), None);
        assert_eq!(throttle.check(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(throttle.check(), Some(2));
        assert_eq!(throttle.check(), None);
    }

    #[test]
    fn once_log_dedupes() {
        let log = OnceLog::new();
        assert!(log.first("400: bad image"));
        assert!(!log.first("400: bad image"));
        assert!(log.first("403: forbidden"));
    }
}
