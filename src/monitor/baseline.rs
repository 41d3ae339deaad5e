//! Daily-start and peak equity baselines
//!
//! Shared by the monitor and the validator refill so drawdowns stay
//! meaningful even when the account source reports stale or missing
//! reference values. The daily baseline resets at UTC midnight to the last
//! equity seen before it.

use crate::account::AccountState;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Baseline {
    day: NaiveDate,
    daily_start_equity: f64,
    peak_equity: f64,
    last_equity: f64,
}

/// Per-account equity baselines
#[derive(Debug, Default)]
pub struct BaselineTracker {
    accounts: DashMap<String, Baseline>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh snapshot into the baselines and overwrite its reference
    /// equities with the tracked ones
    pub fn apply(&self, state: &mut AccountState, now: DateTime<Utc>) {
        let today = now.date_naive();
        let mut baseline = self
            .accounts
            .entry(state.account_id.clone())
            .or_insert_with(|| Baseline {
                day: today,
                daily_start_equity: if state.daily_start_equity > 0.0 {
                    state.daily_start_equity
                } else {
                    state.equity
                },
                peak_equity: state.peak_equity.max(state.equity),
                last_equity: state.equity,
            });

        if baseline.day != today {
            baseline.day = today;
            baseline.daily_start_equity = baseline.last_equity;
        }
        baseline.peak_equity = baseline.peak_equity.max(state.peak_equity).max(state.equity);
        baseline.last_equity = state.equity;

        state.daily_start_equity = baseline.daily_start_equity;
        state.peak_equity = baseline.peak_equity;
    }

    /// Start a new trading day for every account. Returns the number of
    /// accounts rolled.
    pub fn roll_day(&self, now: DateTime<Utc>) -> usize {
        let today = now.date_naive();
        let mut rolled = 0;
        for mut baseline in self.accounts.iter_mut() {
            if baseline.day != today {
                baseline.day = today;
                baseline.daily_start_equity = baseline.last_equity;
                rolled += 1;
            }
        }
        rolled
    }

    pub fn daily_start_equity(&self, account_id: &str) -> Option<f64> {
        self.accounts.get(account_id).map(|b| b.daily_start_equity)
    }
}
