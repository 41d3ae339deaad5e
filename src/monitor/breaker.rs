//! Violation circuit breaker
//!
//! Counts Hard violations in a sliding window. Reaching the threshold trips
//! the breaker once and clears the window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ViolationBreaker {
    threshold: usize,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl ViolationBreaker {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            recent: VecDeque::new(),
        }
    }

    /// Record violations; true when this call trips the breaker
    pub fn record(&mut self, count: usize, now: Instant) -> bool {
        self.prune(now);
        for _ in 0..count {
            self.recent.push_back(now);
        }
        if self.recent.len() >= self.threshold {
            self.recent.clear();
            return true;
        }
        false
    }

    /// Violations currently inside the window
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.recent.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}
