//! Policy evaluation
//!
//! Applicable enabled policies are evaluated in descending priority (stable
//! for equal priority). For pre-trade checks the first Hard or Emergency
//! failure ends evaluation with a reject; the monitor sweeps every policy.
//! Soft failures are collected and never block.

use super::{Decision, Policy, PolicyScope, PolicyType, Violation};
use crate::emergency::{EmergencyStopController, POLICY_ENGINE_TRIGGER};
use crate::risk::RiskMetrics;
use crate::telemetry;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Context an evaluation runs in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationScope {
    pub account_id: String,
    pub symbol: Option<String>,
    pub strategy_id: Option<String>,
}

impl EvaluationScope {
    /// Account-wide scope
    pub fn account(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_strategy(mut self, strategy_id: Option<&str>) -> Self {
        self.strategy_id = strategy_id.map(str::to_string);
        self
    }

    fn applies(&self, scope: &PolicyScope) -> bool {
        match scope {
            PolicyScope::Account => true,
            PolicyScope::Symbol(s) => self.symbol.as_deref() == Some(s.as_str()),
            PolicyScope::Strategy(s) => self.strategy_id.as_deref() == Some(s.as_str()),
        }
    }
}

/// Result of evaluating a policy set
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub decision: Decision,
    pub violations: Vec<Violation>,
}

impl EvaluationResult {
    /// The violation cited by a reject, if any
    pub fn blocking(&self) -> Option<&Violation> {
        match &self.decision {
            Decision::Reject { policy_id, .. } => {
                self.violations.iter().find(|v| &v.policy_id == policy_id)
            }
            Decision::Approve => None,
        }
    }
}

/// Enabled policies that apply to `scope`, highest priority first
fn applicable<'a>(scope: &EvaluationScope, policies: &'a [Policy]) -> Vec<&'a Policy> {
    let mut applicable: Vec<&Policy> = policies
        .iter()
        .filter(|p| p.enabled && scope.applies(&p.scope))
        .collect();
    applicable.sort_by_key(|p| Reverse(p.priority));
    applicable
}

/// The violation `policy` produces against `metrics`, if it fails
fn check(metrics: &RiskMetrics, scope: &EvaluationScope, policy: &Policy) -> Option<Violation> {
    let symbol = match &policy.scope {
        PolicyScope::Symbol(s) => Some(s.as_str()),
        _ => None,
    };
    // Undefined metrics (no margin in use) cannot breach a limit
    let value = metrics.value_of(policy.metric, symbol)?;
    if policy.operator.holds(value, policy.threshold) {
        return None;
    }
    Some(Violation::new(
        policy,
        &scope.account_id,
        symbol.or(scope.symbol.as_deref()),
        value,
    ))
}

fn reject(violation: &Violation) -> Decision {
    Decision::Reject {
        policy_id: violation.policy_id.clone(),
        reason: violation.describe(),
    }
}

/// Evaluate `policies` against `metrics` without side effects. Stops at the
/// first blocking failure.
pub fn evaluate_policies(
    metrics: &RiskMetrics,
    scope: &EvaluationScope,
    policies: &[Policy],
) -> EvaluationResult {
    let mut violations = Vec::new();
    for policy in applicable(scope, policies) {
        let Some(violation) = check(metrics, scope, policy) else {
            continue;
        };
        if policy.policy_type.is_blocking() {
            let decision = reject(&violation);
            violations.push(violation);
            return EvaluationResult {
                decision,
                violations,
            };
        }
        violations.push(violation);
    }

    EvaluationResult {
        decision: Decision::Approve,
        violations,
    }
}

/// Evaluate every applicable policy, collecting all failures in priority
/// order. A reject cites the highest-priority Emergency failure, or the
/// highest-priority Hard one when no Emergency policy failed.
pub fn evaluate_all_policies(
    metrics: &RiskMetrics,
    scope: &EvaluationScope,
    policies: &[Policy],
) -> EvaluationResult {
    let violations: Vec<Violation> = applicable(scope, policies)
        .into_iter()
        .filter_map(|policy| check(metrics, scope, policy))
        .collect();

    let cited = violations
        .iter()
        .find(|v| v.policy_type == PolicyType::Emergency)
        .or_else(|| violations.iter().find(|v| v.policy_type.is_blocking()));
    let decision = cited.map(reject).unwrap_or(Decision::Approve);

    EvaluationResult {
        decision,
        violations,
    }
}

/// Fraction of each enabled Hard limit in use. Upper bounds report
/// `value / threshold`, lower bounds `threshold / value`.
pub fn limit_utilization(metrics: &RiskMetrics, policies: &[Policy]) -> BTreeMap<String, f64> {
    policies
        .iter()
        .filter(|p| p.enabled && p.policy_type == PolicyType::Hard)
        .filter_map(|p| {
            let symbol = match &p.scope {
                PolicyScope::Symbol(s) => Some(s.as_str()),
                _ => None,
            };
            let value = metrics.value_of(p.metric, symbol)?;
            let utilization = if p.operator.is_upper_bound() && p.threshold != 0.0 {
                value / p.threshold
            } else if p.operator.is_lower_bound() && value != 0.0 {
                p.threshold / value
            } else {
                return None;
            };
            Some((p.id.clone(), utilization))
        })
        .collect()
}

/// Evaluates policies and halts trading on Emergency failures
#[derive(Clone)]
pub struct PolicyEngine {
    emergency: Arc<EmergencyStopController>,
}

impl PolicyEngine {
    pub fn new(emergency: Arc<EmergencyStopController>) -> Self {
        Self { emergency }
    }

    /// Pre-trade evaluation: stops at the first blocking failure
    pub fn evaluate(
        &self,
        metrics: &RiskMetrics,
        scope: &EvaluationScope,
        policies: &[Policy],
    ) -> EvaluationResult {
        let result = evaluate_policies(metrics, scope, policies);
        self.act_on(&result);
        result
    }

    /// Monitoring evaluation: every applicable policy is checked, so an
    /// Emergency failure halts trading even behind a higher-priority Hard one
    pub fn evaluate_all(
        &self,
        metrics: &RiskMetrics,
        scope: &EvaluationScope,
        policies: &[Policy],
    ) -> EvaluationResult {
        let result = evaluate_all_policies(metrics, scope, policies);
        self.act_on(&result);
        result
    }

    fn act_on(&self, result: &EvaluationResult) {
        for violation in &result.violations {
            telemetry::record_violation(violation.policy_type.as_str());
            match violation.policy_type {
                PolicyType::Soft => tracing::warn!(
                    policy = %violation.policy_id,
                    account = %violation.account_id,
                    metric = %violation.metric,
                    value = violation.measured_value,
                    threshold = violation.threshold,
                    "Soft policy breached"
                ),
                PolicyType::Hard => tracing::info!(
                    policy = %violation.policy_id,
                    account = %violation.account_id,
                    metric = %violation.metric,
                    value = violation.measured_value,
                    threshold = violation.threshold,
                    "Hard policy breached"
                ),
                PolicyType::Emergency => {
                    self.emergency
                        .trigger(&violation.policy_name, POLICY_ENGINE_TRIGGER);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertPublisher;
    use crate::policy::{Operator, ViolationAction};
    use crate::risk::Metric;

    fn policy(
        id: &str,
        policy_type: PolicyType,
        metric: Metric,
        operator: Operator,
        threshold: f64,
        priority: i32,
    ) -> Policy {
        Policy {
            id: id.to_string(),
            name: id.to_string(),
            policy_type,
            metric,
            operator,
            threshold,
            scope: PolicyScope::Account,
            action: None,
            enabled: true,
            priority,
        }
    }

    fn metrics(leverage: f64) -> RiskMetrics {
        RiskMetrics {
            account_id: "acc-1".to_string(),
            leverage,
            margin_ratio: Some(2.0),
            ..RiskMetrics::default()
        }
    }

    fn engine() -> (PolicyEngine, Arc<EmergencyStopController>) {
        let emergency = Arc::new(EmergencyStopController::new(AlertPublisher::disabled()));
        (PolicyEngine::new(emergency.clone()), emergency)
    }

    #[test]
    fn test_hard_failure_short_circuits() {
        let policies = vec![
            policy("soft-lev", PolicyType::Soft, Metric::Leverage, Operator::Le, 8.0, 10),
            policy("hard-lev", PolicyType::Hard, Metric::Leverage, Operator::Le, 10.0, 100),
        ];
        let result = evaluate_policies(&metrics(12.0), &EvaluationScope::account("acc-1"), &policies);

        assert_eq!(
            result.decision,
            Decision::Reject {
                policy_id: "hard-lev".to_string(),
                reason: result.violations[0].describe(),
            }
        );
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn test_soft_failures_approve_with_violations() {
        let policies = vec![
            policy("soft-lev", PolicyType::Soft, Metric::Leverage, Operator::Le, 5.0, 10),
            policy("hard-lev", PolicyType::Hard, Metric::Leverage, Operator::Le, 10.0, 100),
        ];
        let result = evaluate_policies(&metrics(6.0), &EvaluationScope::account("acc-1"), &policies);

        assert!(result.decision.is_approved());
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].action_taken, ViolationAction::WarningLogged);
    }

    #[test]
    fn test_equal_priority_keeps_input_order() {
        let policies = vec![
            policy("first", PolicyType::Hard, Metric::Leverage, Operator::Le, 1.0, 50),
            policy("second", PolicyType::Hard, Metric::Leverage, Operator::Le, 2.0, 50),
        ];
        let result = evaluate_policies(&metrics(3.0), &EvaluationScope::account("acc-1"), &policies);
        assert!(matches!(
            result.decision,
            Decision::Reject { ref policy_id, .. } if policy_id == "first"
        ));
    }

    #[test]
    fn test_disabled_and_out_of_scope_policies_skipped() {
        let mut disabled = policy("off", PolicyType::Hard, Metric::Leverage, Operator::Le, 1.0, 100);
        disabled.enabled = false;
        let mut other_symbol =
            policy("eth", PolicyType::Hard, Metric::PositionConcentration, Operator::Le, 0.1, 100);
        other_symbol.scope = PolicyScope::Symbol("ETHUSDT".to_string());
        let mut strategy =
            policy("strat", PolicyType::Hard, Metric::Leverage, Operator::Le, 1.0, 100);
        strategy.scope = PolicyScope::Strategy("mm-1".to_string());

        let mut m = metrics(5.0);
        m.position_concentration.insert("ETHUSDT".to_string(), 0.9);
        let scope = EvaluationScope::account("acc-1").with_symbol("BTCUSDT");
        let result = evaluate_policies(&m, &scope, &[disabled, other_symbol, strategy.clone()]);
        assert!(result.decision.is_approved());
        assert!(result.violations.is_empty());

        let scoped = scope.with_strategy(Some("mm-1"));
        let result = evaluate_policies(&m, &scoped, &[strategy]);
        assert!(!result.decision.is_approved());
    }

    #[test]
    fn test_undefined_margin_ratio_passes() {
        let policies = vec![policy(
            "margin",
            PolicyType::Hard,
            Metric::MarginRatio,
            Operator::Ge,
            1.0,
            100,
        )];
        let mut m = metrics(0.0);
        m.margin_ratio = None;
        let result = evaluate_policies(&m, &EvaluationScope::account("acc-1"), &policies);
        assert!(result.decision.is_approved());
    }

    #[test]
    fn test_emergency_failure_triggers_stop() {
        let (engine, emergency) = engine();
        let policies = vec![policy(
            "dd",
            PolicyType::Emergency,
            Metric::DrawdownMax,
            Operator::Le,
            0.25,
            200,
        )];
        let mut m = metrics(1.0);
        m.drawdown_max = 0.3;

        let result = engine.evaluate(&m, &EvaluationScope::account("acc-1"), &policies);
        assert!(!result.decision.is_approved());
        assert!(emergency.is_stopped());
        assert_eq!(
            emergency.status().unwrap().triggered_by,
            POLICY_ENGINE_TRIGGER
        );
    }

    #[test]
    fn test_passing_emergency_policy_leaves_trading_running() {
        let (engine, emergency) = engine();
        let policies = vec![policy(
            "dd",
            PolicyType::Emergency,
            Metric::DrawdownMax,
            Operator::Le,
            0.25,
            200,
        )];
        let result = engine.evaluate(&metrics(1.0), &EvaluationScope::account("acc-1"), &policies);
        assert!(result.decision.is_approved());
        assert!(!emergency.is_stopped());
    }

    #[test]
    fn test_higher_priority_hard_policy_is_cited() {
        let policies = vec![
            policy("loose", PolicyType::Hard, Metric::Leverage, Operator::Le, 20.0, 10),
            policy("strict", PolicyType::Hard, Metric::Leverage, Operator::Le, 5.0, 100),
        ];
        let result = evaluate_policies(&metrics(25.0), &EvaluationScope::account("acc-1"), &policies);

        assert!(matches!(
            result.decision,
            Decision::Reject { ref policy_id, .. } if policy_id == "strict"
        ));
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.blocking().unwrap().threshold, 5.0);
    }

    #[test]
    fn test_full_sweep_collects_every_failure() {
        let policies = vec![
            policy("soft-lev", PolicyType::Soft, Metric::Leverage, Operator::Le, 2.0, 10),
            policy("hard-lev", PolicyType::Hard, Metric::Leverage, Operator::Le, 5.0, 300),
            policy("dd", PolicyType::Emergency, Metric::DrawdownMax, Operator::Le, 0.25, 200),
        ];
        let mut m = metrics(6.0);
        m.drawdown_max = 0.3;
        let result = evaluate_all_policies(&m, &EvaluationScope::account("acc-1"), &policies);

        let ids: Vec<&str> = result.violations.iter().map(|v| v.policy_id.as_str()).collect();
        assert_eq!(ids, ["hard-lev", "dd", "soft-lev"]);
        assert!(matches!(
            result.decision,
            Decision::Reject { ref policy_id, .. } if policy_id == "dd"
        ));
        assert_eq!(result.blocking().unwrap().policy_type, PolicyType::Emergency);
    }

    #[test]
    fn test_evaluate_all_triggers_stop_behind_hard_failure() {
        let (engine, emergency) = engine();
        let policies = vec![
            policy("hard-lev", PolicyType::Hard, Metric::Leverage, Operator::Le, 5.0, 300),
            policy("dd", PolicyType::Emergency, Metric::DrawdownMax, Operator::Le, 0.25, 200),
        ];
        let mut m = metrics(6.0);
        m.drawdown_max = 0.3;

        let short = engine.evaluate(&m, &EvaluationScope::account("acc-1"), &policies);
        assert_eq!(short.violations.len(), 1);
        assert!(!emergency.is_stopped());

        let full = engine.evaluate_all(&m, &EvaluationScope::account("acc-1"), &policies);
        assert_eq!(full.violations.len(), 2);
        assert!(emergency.is_stopped());
        assert_eq!(emergency.status().unwrap().reason, "dd");
    }

    #[test]
    fn test_limit_utilization() {
        let policies = vec![
            policy("lev", PolicyType::Hard, Metric::Leverage, Operator::Le, 10.0, 100),
            policy("margin", PolicyType::Hard, Metric::MarginRatio, Operator::Ge, 1.0, 100),
            policy("soft", PolicyType::Soft, Metric::Leverage, Operator::Le, 5.0, 10),
        ];
        let utilization = limit_utilization(&metrics(4.0), &policies);
        assert!((utilization["lev"] - 0.4).abs() < 1e-12);
        assert!((utilization["margin"] - 0.5).abs() < 1e-12);
        assert!(!utilization.contains_key("soft"));
    }
}
