//! Time-window alert deduplication

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeats of the same key inside a window
#[derive(Debug)]
pub struct AlertDeduplicator {
    window: Duration,
    last_sent: HashMap<String, Instant>,
}

impl AlertDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Returns true when the alert should go out, and starts a new window
    pub fn should_send(&mut self, key: &str, now: Instant) -> bool {
        match self.last_sent.get(key) {
            Some(sent) if now.saturating_duration_since(*sent) < self.window => false,
            _ => {
                self.last_sent.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget keys whose window has passed
    pub fn purge(&mut self, now: Instant) -> usize {
        let before = self.last_sent.len();
        let window = self.window;
        self.last_sent
            .retain(|_, sent| now.saturating_duration_since(*sent) < window);
        before - self.last_sent.len()
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}
