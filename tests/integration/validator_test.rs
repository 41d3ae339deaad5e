//! Pre-trade validator integration tests

use chrono::Utc;
use risk_guard::account::{AccountState, OrderRequest, OrderType, Position, Side, StaticAccountSource};
use risk_guard::alert::AlertPublisher;
use risk_guard::cache::{CacheSettings, MetricCache};
use risk_guard::components::RiskCore;
use risk_guard::health::HealthState;
use risk_guard::policy::{parse_policies, Policy};
use risk_guard::validator::{PreTradeValidator, ValidatorSettings};
use std::sync::Arc;
use std::time::Duration;

const POLICIES: &str = r#"
    [[policies]]
    id = "max-leverage"
    name = "Max Leverage"
    type = "hard"
    metric = "leverage"
    operator = "<="
    threshold = 10.0
    priority = 100

    [[policies]]
    id = "daily-drawdown"
    name = "Daily Drawdown Warning"
    type = "soft"
    metric = "drawdown_daily"
    operator = "<="
    threshold = 0.10
    priority = 50

    [[policies]]
    id = "btc-concentration"
    name = "BTC Concentration"
    type = "hard"
    metric = "position_concentration"
    operator = "<="
    threshold = 0.6
    priority = 80
    scope = { symbol = "BTCUSDT" }

    [[policies]]
    id = "burst"
    name = "Order Burst"
    type = "hard"
    metric = "order_rate"
    operator = "<="
    threshold = 3.0
    priority = 90
"#;

fn account(equity: f64, positions: Vec<Position>) -> AccountState {
    AccountState {
        account_id: "acc-1".to_string(),
        equity,
        balance: equity,
        available_margin: equity,
        margin_used: 0.0,
        unrealized_pnl: 0.0,
        peak_equity: equity,
        daily_start_equity: equity,
        positions,
        pending_orders: vec![],
        as_of: Utc::now(),
    }
}

fn order(id: &str, symbol: &str, quantity: f64, price: f64) -> OrderRequest {
    OrderRequest {
        order_id: id.to_string(),
        account_id: "acc-1".to_string(),
        symbol: symbol.to_string(),
        side: Side::Buy,
        quantity,
        price: Some(price),
        order_type: OrderType::Limit,
        strategy_id: None,
    }
}

async fn validator(state: AccountState, policies: Vec<Policy>) -> PreTradeValidator {
    let cache = Arc::new(MetricCache::in_memory(CacheSettings::default()));
    cache.set_policies(policies).await.unwrap();
    let core = RiskCore::new(
        cache,
        AlertPublisher::disabled(),
        Some(Arc::new(StaticAccountSource::with_accounts([state]))),
        Arc::new(HealthState::new()),
        10.0,
    );
    PreTradeValidator::new(
        core,
        ValidatorSettings {
            check_budget: Duration::from_millis(500),
            cache_budget: Duration::from_millis(200),
        },
    )
}

#[tokio::test]
async fn test_leverage_breach_rejects_with_policy_name() {
    let v = validator(account(10_000.0, vec![]), parse_policies(POLICIES).unwrap()).await;

    // 2.5 BTC at 50k is 125k notional, leverage 12.5
    let decision = v.check_order(&order("o-1", "BTCUSDT", 2.5, 50_000.0)).await;
    assert!(!decision.approved);
    assert!(decision.reason.unwrap().contains("Max Leverage"));
    assert!(decision.metrics.leverage > 10.0);
}

#[tokio::test]
async fn test_symbol_policy_applies_only_to_its_symbol() {
    let v = validator(account(10_000.0, vec![]), parse_policies(POLICIES).unwrap()).await;

    // 7.5k notional against 10k equity on either symbol
    let btc = v.check_order(&order("o-1", "BTCUSDT", 0.15, 50_000.0)).await;
    assert!(!btc.approved);
    assert!(btc.reason.unwrap().contains("BTC Concentration"));

    let eth = v.check_order(&order("o-2", "ETHUSDT", 2.5, 3_000.0)).await;
    assert!(eth.approved);
}

#[tokio::test]
async fn test_order_rate_counts_the_candidate() {
    let v = validator(account(100_000.0, vec![]), parse_policies(POLICIES).unwrap()).await;

    let orders: Vec<_> = (0..4)
        .map(|i| order(&format!("o-{i}"), "ETHUSDT", 0.1, 3_000.0))
        .collect();
    let decisions = v.check_orders(&orders).await;

    assert!(decisions[..3].iter().all(|d| d.approved));
    assert!(!decisions[3].approved);
    assert!(decisions[3].reason.as_deref().unwrap().contains("Order Burst"));
}

#[tokio::test]
async fn test_batch_continues_after_rejection() {
    let v = validator(account(10_000.0, vec![]), parse_policies(POLICIES).unwrap()).await;

    let orders = vec![
        order("bad", "BTCUSDT", -1.0, 50_000.0),
        order("ok", "ETHUSDT", 0.1, 3_000.0),
    ];
    let decisions = v.check_orders(&orders).await;

    assert_eq!(decisions.len(), 2);
    assert!(!decisions[0].approved);
    assert!(decisions[1].approved);
    assert_eq!(decisions[1].order_id, "ok");
}

#[tokio::test]
async fn test_soft_breach_approves_with_violation() {
    let mut state = account(8_500.0, vec![Position {
        symbol: "ETHUSDT".to_string(),
        quantity: 1.0,
        entry_price: 3_000.0,
        current_price: 3_000.0,
        unrealized_pnl: 0.0,
        realized_pnl: 0.0,
        margin_used: 300.0,
    }]);
    state.daily_start_equity = 10_000.0;
    state.peak_equity = 10_000.0;
    let v = validator(state, parse_policies(POLICIES).unwrap()).await;

    let decision = v.check_order(&order("o-1", "ETHUSDT", 0.1, 3_000.0)).await;
    assert!(decision.approved);
    assert_eq!(decision.violations.len(), 1);
    assert_eq!(decision.violations[0].policy_id, "daily-drawdown");
}

#[tokio::test]
async fn test_unknown_account_fails_closed() {
    let v = validator(account(10_000.0, vec![]), parse_policies(POLICIES).unwrap()).await;

    let mut o = order("o-1", "ETHUSDT", 0.1, 3_000.0);
    o.account_id = "ghost".to_string();
    let decision = v.check_order(&o).await;
    assert!(!decision.approved);
    assert!(decision.reason.unwrap().contains("insufficient data"));
}
