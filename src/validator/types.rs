//! Pre-trade decision types

use crate::policy::Violation;
use crate::risk::RiskMetrics;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Answer to a pre-trade check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDecision {
    pub order_id: String,
    pub approved: bool,
    /// Present on every rejection
    pub reason: Option<String>,
    /// Projected metrics the decision was based on
    pub metrics: RiskMetrics,
    pub violations: Vec<Violation>,
    pub latency_us: u64,
}

/// Time budgets for a check
#[derive(Debug, Clone, Copy)]
pub struct ValidatorSettings {
    /// Deadline for a whole check
    pub check_budget: Duration,
    /// Bound on collaborator refills inside a check
    pub cache_budget: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            check_budget: Duration::from_millis(5),
            cache_budget: Duration::from_millis(2),
        }
    }
}
