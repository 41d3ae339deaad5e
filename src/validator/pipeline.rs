//! Pre-trade validation pipeline
//!
//! Halt check, input validation, cache lookups, projected metrics, policy
//! evaluation. Every failure path rejects; nothing here approves by default.

use super::{OrderDecision, ValidatorSettings};
use crate::account::{AccountState, OrderRequest, OrderType};
use crate::components::RiskCore;
use crate::health::Component;
use crate::policy::{Decision, EvaluationScope, Policy, Violation};
use crate::risk::{RiskError, RiskMetrics};
use crate::telemetry;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome before timing is attached
struct Verdict {
    approved: bool,
    reason: Option<String>,
    reject_kind: &'static str,
    metrics: RiskMetrics,
    violations: Vec<Violation>,
}

impl Verdict {
    fn reject(kind: &'static str, reason: String, account_id: &str) -> Self {
        Self {
            approved: false,
            reason: Some(reason),
            reject_kind: kind,
            metrics: RiskMetrics {
                account_id: account_id.to_string(),
                ..RiskMetrics::default()
            },
            violations: Vec::new(),
        }
    }

    fn from_error(error: RiskError, account_id: &str) -> Self {
        Self::reject(error.kind(), error.to_string(), account_id)
    }
}

/// Validates orders against the active policy set
pub struct PreTradeValidator {
    core: RiskCore,
    settings: ValidatorSettings,
}

impl PreTradeValidator {
    pub fn new(core: RiskCore, settings: ValidatorSettings) -> Self {
        Self { core, settings }
    }

    /// Check one order within the configured deadline
    pub async fn check_order(&self, order: &OrderRequest) -> OrderDecision {
        self.check_order_within(order, self.settings.check_budget).await
    }

    /// Check one order within an explicit deadline. A check that overruns is
    /// rejected.
    pub async fn check_order_within(&self, order: &OrderRequest, deadline: Duration) -> OrderDecision {
        let started = Instant::now();
        let verdict = match tokio::time::timeout(deadline, self.evaluate(order)).await {
            Ok(verdict) => verdict,
            Err(_) => Verdict::from_error(
                RiskError::DeadlineExceeded(deadline.as_micros() as u64),
                &order.account_id,
            ),
        };
        let elapsed = started.elapsed();

        telemetry::record_order_check(verdict.approved, elapsed);
        if !verdict.approved {
            telemetry::record_order_rejected(verdict.reject_kind);
            tracing::debug!(
                order_id = %order.order_id,
                account = %order.account_id,
                symbol = %order.symbol,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                latency_us = elapsed.as_micros() as u64,
                "Order rejected"
            );
        }

        OrderDecision {
            order_id: order.order_id.clone(),
            approved: verdict.approved,
            reason: verdict.reason,
            metrics: verdict.metrics,
            violations: verdict.violations,
            latency_us: elapsed.as_micros() as u64,
        }
    }

    /// Check each order independently, in submission order. A rejection
    /// never aborts the rest of the batch.
    pub async fn check_orders(&self, orders: &[OrderRequest]) -> Vec<OrderDecision> {
        let mut decisions = Vec::with_capacity(orders.len());
        for order in orders {
            decisions.push(self.check_order(order).await);
        }
        decisions
    }

    async fn evaluate(&self, order: &OrderRequest) -> Verdict {
        if let Some(reason) = self.core.emergency.halt_reason() {
            return Verdict::reject("halted", format!("trading halted: {reason}"), &order.account_id);
        }

        if let Err(e) = validate_order(order) {
            return Verdict::from_error(e, &order.account_id);
        }

        let (policies, account, prices) = match self.load_inputs(order).await {
            Ok(inputs) => inputs,
            Err(e) => return Verdict::from_error(e, &order.account_id),
        };

        let mut metrics = self
            .core
            .calculator
            .compute_with_hypothetical_fill(&account, &prices, order);
        let rate = self.core.rates.rate(&order.account_id);
        metrics.order_rate = rate.per_second + 1.0;
        metrics.order_rate_per_minute = rate.per_minute + 1.0;

        let scope = EvaluationScope::account(&order.account_id)
            .with_symbol(&order.symbol)
            .with_strategy(order.strategy_id.as_deref());
        let result = self.core.engine.evaluate(&metrics, &scope, &policies);
        self.core.alerts.publish_violations(&result.violations);

        match result.decision {
            Decision::Reject { reason, .. } => Verdict {
                approved: false,
                reason: Some(reason),
                reject_kind: "policy",
                metrics,
                violations: result.violations,
            },
            Decision::Approve => {
                // A stop raised while this check ran wins over the approval
                if let Some(reason) = self.core.emergency.halt_reason() {
                    let mut verdict = Verdict::reject(
                        "halted",
                        format!("trading halted: {reason}"),
                        &order.account_id,
                    );
                    verdict.metrics = metrics;
                    verdict.violations = result.violations;
                    return verdict;
                }
                self.core.rates.record(&order.account_id);
                Verdict {
                    approved: true,
                    reason: None,
                    reject_kind: "",
                    metrics,
                    violations: result.violations,
                }
            }
        }
    }

    async fn load_inputs(
        &self,
        order: &OrderRequest,
    ) -> Result<(Arc<Vec<Policy>>, AccountState, HashMap<String, f64>), RiskError> {
        let policies = match self.core.cache.get_policies().await {
            Some(policies) => policies,
            None => self
                .core
                .cache
                .last_known_policies()
                .ok_or_else(|| RiskError::InsufficientData("no policy set loaded".to_string()))?,
        };

        let account = self.load_account(&order.account_id).await?;

        let mut symbols = account.held_symbols();
        if !symbols.contains(&order.symbol) {
            symbols.push(order.symbol.clone());
        }
        let prices = self.core.cache.get_prices(&symbols).await;

        let priced = order.explicit_price().is_some()
            || prices.contains_key(&order.symbol)
            || account
                .positions
                .iter()
                .any(|p| p.symbol == order.symbol && p.current_price > 0.0);
        if !priced {
            return Err(RiskError::UnknownSymbol(order.symbol.clone()));
        }

        Ok((policies, account, prices))
    }

    /// Fresh cache, then a bounded refill from the account source, then the
    /// last known state
    async fn load_account(&self, account_id: &str) -> Result<AccountState, RiskError> {
        if let Some(state) = self.core.cache.get_account_state(account_id).await {
            return Ok(state);
        }

        if let Some(source) = &self.core.accounts {
            match tokio::time::timeout(self.settings.cache_budget, source.get_account_state(account_id))
                .await
            {
                Ok(Ok(mut state)) => {
                    if !self.core.health.is_healthy(Component::AccountSource) {
                        self.core.health.record_success(Component::AccountSource);
                    }
                    self.core.baselines.apply(&mut state, Utc::now());
                    self.core.cache.remember_account_state(&state);
                    return Ok(state);
                }
                Ok(Err(e)) => {
                    self.core.health.record_failure(Component::AccountSource, &e);
                }
                Err(_) => {
                    tracing::debug!(account = %account_id, "Account refill exceeded cache budget");
                }
            }
        }

        self.core
            .cache
            .last_known_account_state(account_id)
            .ok_or_else(|| RiskError::InsufficientData(format!("no state for account {account_id}")))
    }
}

fn validate_order(order: &OrderRequest) -> Result<(), RiskError> {
    if order.order_id.trim().is_empty() {
        return Err(RiskError::InvalidOrder("order_id is empty".to_string()));
    }
    if order.account_id.trim().is_empty() {
        return Err(RiskError::InvalidOrder("account_id is empty".to_string()));
    }
    if order.symbol.trim().is_empty() {
        return Err(RiskError::InvalidOrder("symbol is empty".to_string()));
    }
    if !(order.quantity.is_finite() && order.quantity > 0.0) {
        return Err(RiskError::InvalidOrder(format!(
            "quantity must be positive, got {}",
            order.quantity
        )));
    }
    match (order.order_type, order.price) {
        (_, Some(p)) if !p.is_finite() || p < 0.0 => Err(RiskError::InvalidOrder(format!(
            "price must be positive, got {p}"
        ))),
        (OrderType::Limit, _) if order.explicit_price().is_none() => Err(RiskError::InvalidOrder(
            "limit order requires a positive price".to_string(),
        )),
        _ => Ok(()),
    }
}
