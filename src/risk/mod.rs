//! Risk module
//!
//! Risk metric computation, projected fills and order rate tracking

mod calculator;
mod rate;
mod types;

pub use calculator::{RiskCalculator, DEFAULT_MARGIN_LEVERAGE};
pub use rate::{OrderRate, OrderRateTracker};
pub use types::{Metric, RiskError, RiskMetrics};
