//! Per-account order rate tracking over sliding windows

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Approved-order counts per account over the last second and minute
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderRate {
    pub per_second: f64,
    pub per_minute: f64,
}

/// Sliding-window counter of approved orders
#[derive(Debug, Default)]
pub struct OrderRateTracker {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl OrderRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an approved order
    pub fn record(&self, account_id: &str) {
        self.record_at(account_id, Instant::now());
    }

    pub fn record_at(&self, account_id: &str, now: Instant) {
        let mut window = self.windows.entry(account_id.to_string()).or_default();
        window.push_back(now);
        prune(&mut window, now);
    }

    /// Current rates for an account
    pub fn rate(&self, account_id: &str) -> OrderRate {
        self.rate_at(account_id, Instant::now())
    }

    pub fn rate_at(&self, account_id: &str, now: Instant) -> OrderRate {
        let Some(mut window) = self.windows.get_mut(account_id) else {
            return OrderRate::default();
        };
        prune(&mut window, now);

        let per_second = window
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < SECOND)
            .count();

        OrderRate {
            per_second: per_second as f64,
            per_minute: window.len() as f64,
        }
    }

    /// Drop accounts with no activity inside the minute window
    pub fn purge_idle(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| {
            prune(window, now);
            !window.is_empty()
        });
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = window.front() {
        if now.saturating_duration_since(*front) >= MINUTE {
            window.pop_front();
        } else {
            break;
        }
    }
}
