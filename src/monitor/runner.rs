//! Continuous risk monitoring loop

use super::ViolationBreaker;
use crate::account::AccountState;
use crate::alert::AlertEvent;
use crate::components::RiskCore;
use crate::emergency::RISK_MONITOR_TRIGGER;
use crate::health::Component;
use crate::policy::{limit_utilization, EvaluationScope, Policy, PolicyScope, PolicyType, Violation, ViolationAction};
use crate::risk::{RiskError, RiskMetrics};
use crate::telemetry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Monitor settings
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Bound on each account source call
    pub fetch_timeout: Duration,
    pub breaker_threshold: usize,
    pub breaker_window: Duration,
    /// Accounts always checked, on top of those the source reports active
    pub watched: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_millis(250),
            breaker_threshold: 5,
            breaker_window: Duration::from_secs(60),
            watched: Vec::new(),
        }
    }
}

/// Result of checking one account
#[derive(Debug, Clone)]
pub struct AccountCheck {
    pub metrics: RiskMetrics,
    pub violations: Vec<Violation>,
}

/// Result of one monitor pass
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub accounts_checked: usize,
    pub failures: usize,
    pub violations: usize,
    pub hard_violations: usize,
    pub breaker_tripped: bool,
}

/// Recomputes metrics for every tracked account on a fixed interval
pub struct RiskMonitor {
    core: RiskCore,
    settings: MonitorSettings,
    breaker: Mutex<ViolationBreaker>,
    latest: DashMap<String, RiskMetrics>,
}

impl RiskMonitor {
    pub fn new(core: RiskCore, settings: MonitorSettings) -> Self {
        Self {
            breaker: Mutex::new(ViolationBreaker::new(
                settings.breaker_threshold,
                settings.breaker_window,
            )),
            core,
            settings,
            latest: DashMap::new(),
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_ms = self.settings.interval.as_millis() as u64, "Risk monitor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.tick().await;
                    tracing::trace!(
                        accounts = summary.accounts_checked,
                        failures = summary.failures,
                        violations = summary.violations,
                        "Monitor tick"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Risk monitor stopped");
    }

    /// Reset daily baselines at each UTC midnight until shutdown
    pub async fn run_daily_rollover(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let wait = until_next_midnight(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let rolled = self.roll_day(Utc::now()).await;
                    tracing::info!(accounts = rolled, "Daily equity baselines reset");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One monitoring pass over every tracked account
    pub async fn tick(&self) -> TickSummary {
        self.core.rates.purge_idle();
        let ids = self.account_ids().await;
        let results = join_all(ids.iter().map(|id| self.check_account(id))).await;

        let mut summary = TickSummary::default();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(check) => {
                    summary.accounts_checked += 1;
                    summary.violations += check.violations.len();
                    summary.hard_violations += check
                        .violations
                        .iter()
                        .filter(|v| v.policy_type == PolicyType::Hard)
                        .count();
                }
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(account = %id, error = %e, "Monitor could not check account");
                }
            }
        }

        if summary.hard_violations > 0 {
            let tripped = self
                .breaker
                .lock()
                .record(summary.hard_violations, Instant::now());
            if tripped {
                summary.breaker_tripped = true;
                telemetry::record_breaker_trip();
                let reason = format!(
                    "circuit breaker: {} hard violations within {}s",
                    self.settings.breaker_threshold,
                    self.settings.breaker_window.as_secs()
                );
                self.core.emergency.trigger(&reason, RISK_MONITOR_TRIGGER);
            }
        }

        summary
    }

    /// Refresh, compute, evaluate and publish for one account
    pub async fn check_account(&self, account_id: &str) -> Result<AccountCheck, RiskError> {
        let state = self.refresh_account(account_id).await?;
        let mut metrics = self.compute(&state).await;

        let policies = self
            .core
            .cache
            .get_policies()
            .await
            .or_else(|| self.core.cache.last_known_policies());

        let mut violations = Vec::new();
        match &policies {
            Some(policies) => {
                if state.open_positions() > 0 {
                    violations = self.evaluate(&state, &metrics, policies);
                }
                metrics.limit_utilization = limit_utilization(&metrics, policies);
            }
            None => tracing::warn!(account = %account_id, "No policy set loaded, skipping evaluation"),
        }

        self.core.alerts.publish_violations(&violations);
        self.core.alerts.publish(AlertEvent::Metrics(metrics.clone()));
        telemetry::record_account_metrics(&metrics);

        self.latest.insert(account_id.to_string(), metrics.clone());

        Ok(AccountCheck {
            metrics,
            violations,
        })
    }

    /// Metrics for an account without evaluating policies
    pub async fn current_metrics(&self, account_id: &str) -> Result<RiskMetrics, RiskError> {
        let state = match self.core.cache.get_account_state(account_id).await {
            Some(state) => state,
            None => self.refresh_account(account_id).await?,
        };
        Ok(self.compute(&state).await)
    }

    /// Metrics from the most recent pass
    pub fn latest_metrics(&self, account_id: &str) -> Option<RiskMetrics> {
        self.latest.get(account_id).map(|entry| entry.value().clone())
    }

    /// Roll daily baselines and rewrite cached states to match
    pub async fn roll_day(&self, now: DateTime<Utc>) -> usize {
        let rolled = self.core.baselines.roll_day(now);
        for id in self.core.cache.cached_account_ids() {
            let Some(mut state) = self.core.cache.last_known_account_state(&id) else {
                continue;
            };
            state.daily_start_equity = self
                .core
                .baselines
                .daily_start_equity(&id)
                .unwrap_or(state.equity);
            if let Err(e) = self.core.cache.set_account_state(&state).await {
                tracing::debug!(account = %id, error = %e, "Shared cache write failed during rollover");
            }
        }
        rolled
    }

    async fn account_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.settings.watched.iter().cloned().collect();
        ids.extend(self.core.cache.cached_account_ids());

        if let Some(source) = &self.core.accounts {
            match tokio::time::timeout(self.settings.fetch_timeout, source.active_accounts()).await {
                Ok(Ok(active)) => ids.extend(active),
                Ok(Err(e)) => self.core.health.record_failure(Component::AccountSource, &e),
                Err(_) => self
                    .core
                    .health
                    .record_failure(Component::AccountSource, "active accounts timed out"),
            }
        }
        ids.into_iter().collect()
    }

    /// Pull a fresh snapshot from the source, falling back to the cache
    async fn refresh_account(&self, account_id: &str) -> Result<AccountState, RiskError> {
        if let Some(source) = &self.core.accounts {
            match tokio::time::timeout(self.settings.fetch_timeout, source.get_account_state(account_id))
                .await
            {
                Ok(Ok(mut state)) => {
                    self.core.health.record_success(Component::AccountSource);
                    self.core.baselines.apply(&mut state, Utc::now());
                    if let Err(e) = self.core.cache.set_account_state(&state).await {
                        tracing::debug!(account = %account_id, error = %e, "Shared cache write failed");
                    }
                    return Ok(state);
                }
                Ok(Err(e)) => self.core.health.record_failure(Component::AccountSource, &e),
                Err(_) => self
                    .core
                    .health
                    .record_failure(Component::AccountSource, "account fetch timed out"),
            }
        }

        match self.core.cache.get_account_state(account_id).await {
            Some(state) => Ok(state),
            None => self
                .core
                .cache
                .last_known_account_state(account_id)
                .ok_or_else(|| RiskError::InsufficientData(format!("no state for account {account_id}"))),
        }
    }

    async fn compute(&self, state: &AccountState) -> RiskMetrics {
        let prices = self.core.cache.get_prices(&state.held_symbols()).await;
        let mut metrics = self.core.calculator.compute(state, &prices);
        let rate = self.core.rates.rate(&state.account_id);
        metrics.order_rate = rate.per_second;
        metrics.order_rate_per_minute = rate.per_minute;
        metrics
    }

    /// Account scope once, then each held symbol against its own
    /// Symbol-scoped policies. Every policy is checked so Emergency limits
    /// fire even when a higher-priority Hard limit has already failed.
    fn evaluate(&self, state: &AccountState, metrics: &RiskMetrics, policies: &[Policy]) -> Vec<Violation> {
        let account_scope = EvaluationScope::account(&state.account_id);
        let mut violations = self
            .core
            .engine
            .evaluate_all(metrics, &account_scope, policies)
            .violations;

        for symbol in state.held_symbols() {
            let symbol_policies: Vec<Policy> = policies
                .iter()
                .filter(|p| matches!(&p.scope, PolicyScope::Symbol(s) if *s == symbol))
                .cloned()
                .collect();
            if symbol_policies.is_empty() {
                continue;
            }
            let scope = account_scope.clone().with_symbol(&symbol);
            violations.extend(
                self.core
                    .engine
                    .evaluate_all(metrics, &scope, &symbol_policies)
                    .violations,
            );
        }

        for violation in &mut violations {
            if violation.policy_type == PolicyType::Hard {
                violation.action_taken = ViolationAction::AlertRaised;
            }
        }
        violations
    }
}

fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    now.date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc() - now)
        .and_then(|delta| delta.to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}
