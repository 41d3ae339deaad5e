//! Alert event and topic types

use crate::emergency::EmergencyStopRecord;
use crate::policy::{PolicyType, Violation};
use crate::risk::RiskMetrics;
use serde::Serialize;
use thiserror::Error;

/// Alert delivery errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert bus unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode alert: {0}")]
    Encode(String),
}

/// Logical alert topic, rendered as `<prefix>.alerts.<level>` or
/// `<prefix>.metrics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertTopic {
    Critical,
    Warning,
    Emergency,
    Metrics,
}

impl AlertTopic {
    pub fn name(&self, prefix: &str) -> String {
        match self {
            AlertTopic::Critical => format!("{prefix}.alerts.critical"),
            AlertTopic::Warning => format!("{prefix}.alerts.warning"),
            AlertTopic::Emergency => format!("{prefix}.alerts.emergency"),
            AlertTopic::Metrics => format!("{prefix}.metrics"),
        }
    }
}

/// Event carried by the alert pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Violation(Violation),
    EmergencyStop(EmergencyStopRecord),
    EmergencyCleared(EmergencyStopRecord),
    Metrics(RiskMetrics),
}

impl AlertEvent {
    pub fn topic(&self) -> AlertTopic {
        match self {
            AlertEvent::Violation(v) => match v.policy_type {
                PolicyType::Hard => AlertTopic::Critical,
                PolicyType::Soft => AlertTopic::Warning,
                PolicyType::Emergency => AlertTopic::Emergency,
            },
            AlertEvent::EmergencyStop(_) | AlertEvent::EmergencyCleared(_) => {
                AlertTopic::Emergency
            }
            AlertEvent::Metrics(_) => AlertTopic::Metrics,
        }
    }

    /// Key for duplicate suppression. Emergency traffic and metric snapshots
    /// are never suppressed.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            AlertEvent::Violation(v) if v.policy_type != PolicyType::Emergency => Some(format!(
                "{}:{}:{}",
                v.policy_id, v.account_id, v.metric
            )),
            _ => None,
        }
    }

    /// Whether the event belongs in the audit trail
    pub fn is_auditable(&self) -> bool {
        !matches!(self, AlertEvent::Metrics(_))
    }
}
