//! Risk metric types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Pre-trade check failures that are not policy violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Order fields are malformed
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    /// Market order for a symbol with no known price
    #[error("invalid order: no price available for symbol {0}")]
    UnknownSymbol(String),
    /// Required inputs missing from every cache tier and the collaborators
    #[error("insufficient data to evaluate risk \u{2014} rejecting ({0})")]
    InsufficientData(String),
    /// The check did not complete inside its deadline
    #[error("risk check exceeded deadline of {0}us")]
    DeadlineExceeded(u64),
}

impl RiskError {
    /// Short label used for the rejection metric
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::InvalidOrder(_) | RiskError::UnknownSymbol(_) => "invalid_order",
            RiskError::InsufficientData(_) => "insufficient_data",
            RiskError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }
}

/// Metrics a policy can be written against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Leverage,
    MarginRatio,
    DrawdownDaily,
    DrawdownMax,
    PositionConcentration,
    OrderRate,
    OrderRatePerMinute,
    DailyPnl,
    TotalEquity,
    TotalMarginUsed,
    UnrealizedPnl,
    OpenPositions,
    PendingOrders,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Leverage => "leverage",
            Metric::MarginRatio => "margin_ratio",
            Metric::DrawdownDaily => "drawdown_daily",
            Metric::DrawdownMax => "drawdown_max",
            Metric::PositionConcentration => "position_concentration",
            Metric::OrderRate => "order_rate",
            Metric::OrderRatePerMinute => "order_rate_per_minute",
            Metric::DailyPnl => "daily_pnl",
            Metric::TotalEquity => "total_equity",
            Metric::TotalMarginUsed => "total_margin_used",
            Metric::UnrealizedPnl => "unrealized_pnl",
            Metric::OpenPositions => "open_positions",
            Metric::PendingOrders => "pending_orders",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk metrics for one account at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub account_id: String,
    /// Total absolute notional over equity
    pub leverage: f64,
    /// Equity over margin used; `None` when no margin is in use
    pub margin_ratio: Option<f64>,
    /// Fractional loss from the day's starting equity, never negative
    pub drawdown_daily: f64,
    /// Fractional loss from peak equity, never negative
    pub drawdown_max: f64,
    /// Per-symbol notional over equity
    pub position_concentration: BTreeMap<String, f64>,
    /// Orders per second, including the candidate order on pre-trade checks
    pub order_rate: f64,
    pub order_rate_per_minute: f64,
    pub daily_pnl: f64,
    pub total_equity: f64,
    pub total_margin_used: f64,
    pub total_notional: f64,
    pub unrealized_pnl: f64,
    pub open_positions: usize,
    pub pending_orders: usize,
    /// Hard policy id to fraction of its limit in use (1.0 = at the limit)
    #[serde(default)]
    pub limit_utilization: BTreeMap<String, f64>,
    pub computed_at: DateTime<Utc>,
}

impl RiskMetrics {
    /// Largest single-symbol concentration, 0 when flat
    pub fn max_concentration(&self) -> f64 {
        self.position_concentration
            .values()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Value of a metric. `symbol` selects a single symbol's concentration;
    /// without it the maximum is used. Returns `None` when the metric is
    /// undefined for this account.
    pub fn value_of(&self, metric: Metric, symbol: Option<&str>) -> Option<f64> {
        let value = match metric {
            Metric::Leverage => self.leverage,
            Metric::MarginRatio => return self.margin_ratio,
            Metric::DrawdownDaily => self.drawdown_daily,
            Metric::DrawdownMax => self.drawdown_max,
            Metric::PositionConcentration => match symbol {
                Some(s) => self.position_concentration.get(s).copied().unwrap_or(0.0),
                None => self.max_concentration(),
            },
            Metric::OrderRate => self.order_rate,
            Metric::OrderRatePerMinute => self.order_rate_per_minute,
            Metric::DailyPnl => self.daily_pnl,
            Metric::TotalEquity => self.total_equity,
            Metric::TotalMarginUsed => self.total_margin_used,
            Metric::UnrealizedPnl => self.unrealized_pnl,
            Metric::OpenPositions => self.open_positions as f64,
            Metric::PendingOrders => self.pending_orders as f64,
        };
        Some(value)
    }
}
