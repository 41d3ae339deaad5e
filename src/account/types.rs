//! Account, position and order types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance used when checking `equity == balance + unrealized_pnl`
const EQUITY_TOLERANCE: f64 = 1e-6;

/// Account source errors
#[derive(Debug, Error)]
pub enum AccountError {
    /// Account is not known to the source
    #[error("Account not found: {0}")]
    NotFound(String),
    /// Transport or upstream failure
    #[error("Account source unavailable: {0}")]
    Unavailable(String),
    /// Upstream returned a state that breaks the account invariants
    #[error("Inconsistent account state for {account_id}: {detail}")]
    Inconsistent { account_id: String, detail: String },
    /// Response body could not be decoded
    #[error("Failed to decode account state: {0}")]
    Decode(String),
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// An open position. Positive quantity is long, negative is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub margin_used: f64,
}

impl Position {
    /// Absolute notional value at the current mark
    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.current_price
    }

    /// True when the position carries exposure
    pub fn is_open(&self) -> bool {
        self.quantity != 0.0
    }
}

/// An order submitted for pre-trade validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    /// Limit price. Market orders may omit it and are priced from the cache.
    #[serde(default)]
    pub price: Option<f64>,
    pub order_type: OrderType,
    #[serde(default)]
    pub strategy_id: Option<String>,
}

impl OrderRequest {
    /// Explicit positive price, if the order carries one
    pub fn explicit_price(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Snapshot of an account as reported by the account source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: String,
    pub equity: f64,
    pub balance: f64,
    pub available_margin: f64,
    pub margin_used: f64,
    pub unrealized_pnl: f64,
    pub peak_equity: f64,
    pub daily_start_equity: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub pending_orders: Vec<OrderRequest>,
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl AccountState {
    /// Symbols with non-zero exposure
    pub fn held_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Number of positions carrying exposure
    pub fn open_positions(&self) -> usize {
        self.positions.iter().filter(|p| p.is_open()).count()
    }

    /// Check the invariants an upstream snapshot must satisfy
    pub fn validate(&self) -> Result<(), AccountError> {
        let fields = [
            ("equity", self.equity),
            ("balance", self.balance),
            ("available_margin", self.available_margin),
            ("margin_used", self.margin_used),
            ("unrealized_pnl", self.unrealized_pnl),
            ("peak_equity", self.peak_equity),
            ("daily_start_equity", self.daily_start_equity),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(self.inconsistent(format!("{name} is not finite")));
        }
        if self.margin_used < 0.0 {
            return Err(self.inconsistent("margin_used is negative".to_string()));
        }

        let expected = self.balance + self.unrealized_pnl;
        let scale = expected.abs().max(self.equity.abs()).max(1.0);
        if (self.equity - expected).abs() > EQUITY_TOLERANCE * scale {
            return Err(self.inconsistent(format!(
                "equity {} != balance {} + unrealized_pnl {}",
                self.equity, self.balance, self.unrealized_pnl
            )));
        }

        if let Some(p) = self
            .positions
            .iter()
            .find(|p| !p.quantity.is_finite() || !p.current_price.is_finite())
        {
            return Err(self.inconsistent(format!("position {} has non-finite values", p.symbol)));
        }

        Ok(())
    }

    fn inconsistent(&self, detail: String) -> AccountError {
        AccountError::Inconsistent {
            account_id: self.account_id.clone(),
            detail,
        }
    }
}
