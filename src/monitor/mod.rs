//! Risk monitor module
//!
//! Background recomputation of account metrics, continuous policy
//! evaluation and the violation circuit breaker

mod baseline;
mod breaker;
mod runner;

pub use baseline::BaselineTracker;
pub use breaker::ViolationBreaker;
pub use runner::{AccountCheck, MonitorSettings, RiskMonitor, TickSummary};
