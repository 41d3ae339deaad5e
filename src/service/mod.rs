//! Risk service module
//!
//! The logical RPC surface over the validator, monitor and emergency
//! controller, plus startup wiring and the JSON/HTTP adapter.

mod http;
mod refresh;
mod runtime;

pub use http::{router, AuthSettings};
pub use refresh::PolicyRefresher;
pub use runtime::{start, Runtime};

use crate::account::OrderRequest;
use crate::components::RiskCore;
use crate::emergency::{EmergencyError, EmergencyStopRecord};
use crate::health::HealthReport;
use crate::monitor::RiskMonitor;
use crate::risk::{RiskError, RiskMetrics};
use crate::validator::{OrderDecision, PreTradeValidator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Acknowledgement of an emergency stop command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// False when the command changed nothing
    pub success: bool,
    pub message: String,
    pub record: Option<EmergencyStopRecord>,
}

/// Facade over the risk core
pub struct RiskService {
    core: RiskCore,
    validator: PreTradeValidator,
    monitor: Arc<RiskMonitor>,
}

impl RiskService {
    pub fn new(core: RiskCore, validator: PreTradeValidator, monitor: Arc<RiskMonitor>) -> Self {
        Self {
            core,
            validator,
            monitor,
        }
    }

    pub fn core(&self) -> &RiskCore {
        &self.core
    }

    pub fn monitor(&self) -> &Arc<RiskMonitor> {
        &self.monitor
    }

    pub async fn check_order(&self, order: &OrderRequest) -> OrderDecision {
        self.validator.check_order(order).await
    }

    pub async fn check_orders(&self, orders: &[OrderRequest]) -> Vec<OrderDecision> {
        self.validator.check_orders(orders).await
    }

    /// Latest monitor snapshot, or a fresh computation when the monitor has
    /// not seen the account yet
    pub async fn get_risk_metrics(&self, account_id: &str) -> Result<RiskMetrics, RiskError> {
        if let Some(metrics) = self.monitor.latest_metrics(account_id) {
            return Ok(metrics);
        }
        self.monitor.current_metrics(account_id).await
    }

    pub fn trigger_emergency_stop(&self, reason: &str, triggered_by: &str) -> Ack {
        let activated = self.core.emergency.trigger(reason, triggered_by);
        Ack {
            success: activated,
            message: if activated {
                "emergency stop activated".to_string()
            } else {
                "emergency stop already active".to_string()
            },
            record: self.core.emergency.status(),
        }
    }

    pub fn emergency_stop_status(&self) -> Option<EmergencyStopRecord> {
        self.core.emergency.status()
    }

    /// Record unwind progress on the active stop
    pub fn report_unwind_progress(
        &self,
        orders_canceled: u32,
        positions_closed: u32,
    ) -> Result<Ack, EmergencyError> {
        let record = self
            .core
            .emergency
            .update_progress(orders_canceled, positions_closed)?;
        Ok(Ack {
            success: true,
            message: "unwind progress recorded".to_string(),
            record: Some(record),
        })
    }

    pub fn complete_unwind(&self) -> Result<Ack, EmergencyError> {
        let record = self.core.emergency.complete()?;
        Ok(Ack {
            success: true,
            message: "emergency unwind completed".to_string(),
            record: Some(record),
        })
    }

    pub fn re_enable_trading(&self, authorized_by: &str, reason: &str) -> Result<Ack, EmergencyError> {
        let cleared = self.core.emergency.re_enable(authorized_by, reason)?;
        Ok(Ack {
            success: true,
            message: "trading re-enabled".to_string(),
            record: Some(cleared),
        })
    }

    pub fn health(&self) -> HealthReport {
        self.core.health.report(self.core.emergency.is_stopped())
    }
}
