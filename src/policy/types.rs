//! Policy, decision and violation types

use crate::risk::Metric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Policy loading errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy definition is malformed
    #[error("Invalid policy {id}: {reason}")]
    InvalidPolicy { id: String, reason: String },
    /// The policy source could not be read
    #[error("Policy store unavailable: {0}")]
    Unavailable(String),
    /// The policy document could not be parsed
    #[error("Failed to parse policies: {0}")]
    Parse(String),
}

/// Enforcement class of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Blocks the order
    Hard,
    /// Logs a warning and lets the order through
    Soft,
    /// Blocks the order and halts all trading
    Emergency,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Hard => "hard",
            PolicyType::Soft => "soft",
            PolicyType::Emergency => "emergency",
        }
    }

    /// Hard and Emergency failures stop evaluation
    pub fn is_blocking(&self) -> bool {
        matches!(self, PolicyType::Hard | PolicyType::Emergency)
    }
}

/// Comparison operator. A policy passes while `metric <op> threshold` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<", alias = "lt", alias = "less_than")]
    Lt,
    #[serde(rename = "<=", alias = "le", alias = "less_than_or_equal")]
    Le,
    #[serde(rename = ">", alias = "gt", alias = "greater_than")]
    Gt,
    #[serde(rename = ">=", alias = "ge", alias = "greater_than_or_equal")]
    Ge,
    #[serde(rename = "==", alias = "eq", alias = "equal")]
    Eq,
    #[serde(rename = "!=", alias = "ne", alias = "not_equal")]
    Ne,
}

impl Operator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
            Operator::Eq => value == threshold,
            Operator::Ne => value != threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }

    /// True when the threshold is a ceiling on the metric
    pub fn is_upper_bound(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le)
    }

    /// True when the threshold is a floor on the metric
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Ge)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a policy applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    #[default]
    Account,
    Symbol(String),
    Strategy(String),
}

fn default_enabled() -> bool {
    true
}

/// A declarative risk rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub metric: Metric,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default)]
    pub scope: PolicyScope,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

impl Policy {
    /// Reject definitions that could never be evaluated meaningfully
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidPolicy {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !self.threshold.is_finite() {
            return Err(invalid("threshold is not finite"));
        }
        match &self.scope {
            PolicyScope::Symbol(s) if s.trim().is_empty() => Err(invalid("symbol scope is empty")),
            PolicyScope::Strategy(s) if s.trim().is_empty() => {
                Err(invalid("strategy scope is empty"))
            }
            _ => Ok(()),
        }
    }
}

/// What the system did about a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    OrderRejected,
    EmergencyStopTriggered,
    WarningLogged,
    AlertRaised,
}

impl ViolationAction {
    pub fn for_policy(policy_type: PolicyType) -> Self {
        match policy_type {
            PolicyType::Hard => ViolationAction::OrderRejected,
            PolicyType::Soft => ViolationAction::WarningLogged,
            PolicyType::Emergency => ViolationAction::EmergencyStopTriggered,
        }
    }
}

/// Record of a failed policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: Uuid,
    pub policy_id: String,
    pub policy_name: String,
    pub policy_type: PolicyType,
    pub account_id: String,
    pub symbol: Option<String>,
    pub metric: Metric,
    pub measured_value: f64,
    pub threshold: f64,
    pub operator: Operator,
    pub action_taken: ViolationAction,
    pub violation_time: DateTime<Utc>,
}

impl Violation {
    pub fn new(policy: &Policy, account_id: &str, symbol: Option<&str>, measured_value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            policy_type: policy.policy_type,
            account_id: account_id.to_string(),
            symbol: symbol.map(str::to_string),
            metric: policy.metric,
            measured_value,
            threshold: policy.threshold,
            operator: policy.operator,
            action_taken: ViolationAction::for_policy(policy.policy_type),
            violation_time: Utc::now(),
        }
    }

    /// Human-readable rejection reason
    pub fn describe(&self) -> String {
        format!(
            "{}: {} {:.4} breaches limit {} {}",
            self.policy_name, self.metric, self.measured_value, self.operator, self.threshold
        )
    }
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { policy_id: String, reason: String },
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Policy {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_operator_semantics() {
        assert!(Operator::Le.holds(10.0, 10.0));
        assert!(!Operator::Le.holds(12.0, 10.0));
        assert!(Operator::Ge.holds(1.0, 1.0));
        assert!(!Operator::Gt.holds(1.0, 1.0));
        assert!(Operator::Ne.holds(2.0, 1.0));
        assert!(!Operator::Eq.holds(2.0, 1.0));
    }

    #[test]
    fn test_policy_from_toml_symbol_scope() {
        let policy = parse(
            r#"
            id = "btc-conc"
            name = "BTC Concentration"
            type = "hard"
            metric = "position_concentration"
            operator = "<="
            threshold = 0.5
            scope = { symbol = "BTCUSDT" }
            priority = 50
            "#,
        );
        assert_eq!(policy.scope, PolicyScope::Symbol("BTCUSDT".to_string()));
        assert_eq!(policy.operator, Operator::Le);
        assert!(policy.enabled);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_operator_aliases() {
        let policy = parse(
            r#"
            id = "p"
            name = "Margin"
            type = "soft"
            metric = "margin_ratio"
            operator = "greater_than_or_equal"
            threshold = 1.5
            "#,
        );
        assert_eq!(policy.operator, Operator::Ge);
        assert_eq!(policy.scope, PolicyScope::Account);
    }

    #[test]
    fn test_validate_rejects_empty_scope() {
        let mut policy = parse(
            r#"
            id = "p"
            name = "Strategy leverage"
            type = "hard"
            metric = "leverage"
            operator = "<="
            threshold = 3.0
            "#,
        );
        policy.scope = PolicyScope::Strategy(" ".to_string());
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InvalidPolicy { .. })
        ));

        policy.scope = PolicyScope::Account;
        policy.threshold = f64::NAN;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_violation_describe_names_policy() {
        let policy = parse(
            r#"
            id = "lev"
            name = "Max Leverage"
            type = "hard"
            metric = "leverage"
            operator = "<="
            threshold = 10.0
            "#,
        );
        let violation = Violation::new(&policy, "acc-1", None, 12.0);
        assert!(violation.describe().contains("Max Leverage"));
        assert_eq!(violation.action_taken, ViolationAction::OrderRejected);
    }
}
