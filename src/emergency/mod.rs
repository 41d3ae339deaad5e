//! Emergency stop module
//!
//! Global trading halt with an audited trigger/re-enable lifecycle

mod controller;
mod types;

pub use controller::EmergencyStopController;
pub use types::{EmergencyError, EmergencyStopRecord, StopStatus, TradingState};

/// `triggered_by` used when the policy engine halts trading
pub const POLICY_ENGINE_TRIGGER: &str = "system:policy-engine";
/// `triggered_by` used when the monitor's circuit breaker halts trading
pub const RISK_MONITOR_TRIGGER: &str = "system:risk-monitor";
