//! Risk metric computation
//!
//! Pure functions of an account snapshot and a price map. No I/O, no shared
//! state; the same inputs always produce the same metrics.

use super::RiskMetrics;
use crate::account::{AccountState, OrderRequest, Position};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

/// Default leverage used to estimate margin consumed by a hypothetical fill
pub const DEFAULT_MARGIN_LEVERAGE: f64 = 10.0;

/// Computes current and projected risk metrics
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    margin_leverage: f64,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN_LEVERAGE)
    }
}

impl RiskCalculator {
    pub fn new(margin_leverage: f64) -> Self {
        let margin_leverage = if margin_leverage.is_finite() && margin_leverage > 0.0 {
            margin_leverage
        } else {
            DEFAULT_MARGIN_LEVERAGE
        };
        Self { margin_leverage }
    }

    /// Compute metrics for an account, marking positions at `prices` where
    /// a price is known and at their own `current_price` otherwise.
    pub fn compute(&self, account: &AccountState, prices: &HashMap<String, f64>) -> RiskMetrics {
        let mut exposure: BTreeMap<String, f64> = BTreeMap::new();
        for position in account.positions.iter().filter(|p| p.is_open()) {
            let mark = mark_price(prices, position);
            *exposure.entry(position.symbol.clone()).or_insert(0.0) +=
                position.quantity.abs() * mark;
        }
        let total_notional: f64 = exposure.values().sum();
        let equity = account.equity;

        let leverage = ratio_or_unbounded(total_notional, equity);

        let margin_ratio = if account.margin_used > 0.0 {
            Some(equity / account.margin_used)
        } else {
            None
        };

        let position_concentration = exposure
            .into_iter()
            .map(|(symbol, notional)| (symbol, ratio_or_unbounded(notional, equity)))
            .collect();

        RiskMetrics {
            account_id: account.account_id.clone(),
            leverage,
            margin_ratio,
            drawdown_daily: drawdown(account.daily_start_equity, equity),
            drawdown_max: drawdown(account.peak_equity, equity),
            position_concentration,
            order_rate: 0.0,
            order_rate_per_minute: 0.0,
            daily_pnl: equity - account.daily_start_equity,
            total_equity: equity,
            total_margin_used: account.margin_used,
            total_notional,
            unrealized_pnl: account.unrealized_pnl,
            open_positions: account.open_positions(),
            pending_orders: account.pending_orders.len(),
            limit_utilization: BTreeMap::new(),
            computed_at: Utc::now(),
        }
    }

    /// Compute the metrics the account would have if `order` filled
    /// completely at its limit price, or at the marked price for market
    /// orders.
    pub fn compute_with_hypothetical_fill(
        &self,
        account: &AccountState,
        prices: &HashMap<String, f64>,
        order: &OrderRequest,
    ) -> RiskMetrics {
        let projected = self.project_fill(account, prices, order);
        self.compute(&projected, &HashMap::new())
    }

    /// Synthesize the account state after a complete fill of `order`.
    ///
    /// Existing positions are re-marked at `prices` first. The filled leg is
    /// valued at the fill price, so the symbol's notional moves by exactly
    /// `quantity * fill_price` on an increase.
    pub fn project_fill(
        &self,
        account: &AccountState,
        prices: &HashMap<String, f64>,
        order: &OrderRequest,
    ) -> AccountState {
        let mut state = account.clone();
        for position in &mut state.positions {
            position.current_price = mark_price(prices, position);
        }

        let fill_price = order
            .explicit_price()
            .or_else(|| valid_price(prices.get(&order.symbol).copied()))
            .or_else(|| {
                state
                    .positions
                    .iter()
                    .find(|p| p.symbol == order.symbol)
                    .map(|p| p.current_price)
            })
            .unwrap_or(0.0);
        let signed_qty = order.side.sign() * order.quantity;

        let before = symbol_notional(&state.positions, &order.symbol);
        match state
            .positions
            .iter_mut()
            .find(|p| p.symbol == order.symbol)
        {
            Some(position) => apply_fill(position, signed_qty, fill_price),
            None => state.positions.push(Position {
                symbol: order.symbol.clone(),
                quantity: signed_qty,
                entry_price: fill_price,
                current_price: fill_price,
                unrealized_pnl: 0.0,
                realized_pnl: 0.0,
                margin_used: 0.0,
            }),
        }
        let after = symbol_notional(&state.positions, &order.symbol);

        let margin_delta = (after - before) / self.margin_leverage;
        state.margin_used = (state.margin_used + margin_delta).max(0.0);
        state.available_margin -= margin_delta;
        state
    }
}

fn valid_price(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite() && *p > 0.0)
}

fn mark_price(prices: &HashMap<String, f64>, position: &Position) -> f64 {
    valid_price(prices.get(&position.symbol).copied()).unwrap_or(position.current_price)
}

fn symbol_notional(positions: &[Position], symbol: &str) -> f64 {
    positions
        .iter()
        .filter(|p| p.symbol == symbol)
        .map(Position::notional)
        .sum()
}

/// Merge a signed fill into an existing position
fn apply_fill(position: &mut Position, signed_qty: f64, fill_price: f64) {
    let old_qty = position.quantity;
    let new_qty = old_qty + signed_qty;

    if old_qty == 0.0 || old_qty.signum() == signed_qty.signum() {
        // Increase: weighted entry, blended mark so each leg keeps its value
        let old_value = old_qty.abs() * position.current_price;
        let added_value = signed_qty.abs() * fill_price;
        let total = new_qty.abs();
        if total > 0.0 {
            position.entry_price =
                (old_qty.abs() * position.entry_price + added_value) / total;
            position.current_price = (old_value + added_value) / total;
        }
    } else if new_qty == 0.0 || new_qty.signum() == old_qty.signum() {
        // Reduce or close: remaining exposure keeps its entry and mark
    } else {
        // Flip: the residual is a fresh position opened at the fill price
        position.entry_price = fill_price;
        position.current_price = fill_price;
    }
    position.quantity = new_qty;
}

fn drawdown(reference: f64, equity: f64) -> f64 {
    if reference > 0.0 {
        ((reference - equity) / reference).max(0.0)
    } else {
        0.0
    }
}

/// `numerator / equity`, 0 when there is nothing to divide and unbounded
/// when exposure exists against non-positive equity
fn ratio_or_unbounded(numerator: f64, equity: f64) -> f64 {
    if numerator == 0.0 {
        0.0
    } else if equity > 0.0 {
        numerator / equity
    } else {
        f64::INFINITY
    }
}
