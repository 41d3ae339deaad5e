//! End-to-end integration tests

use chrono::Utc;
use risk_guard::account::{AccountState, OrderRequest, OrderType, Position, Side, StaticAccountSource};
use risk_guard::alert::{AlertEvent, AlertPublisher, AlertSettings, MemoryAlertBus, MemoryAuditSink};
use risk_guard::cache::{CacheSettings, MetricCache};
use risk_guard::components::RiskCore;
use risk_guard::config::Config;
use risk_guard::health::HealthState;
use risk_guard::monitor::{MonitorSettings, RiskMonitor};
use risk_guard::policy::{default_policies, Policy};
use risk_guard::service::RiskService;
use risk_guard::validator::{PreTradeValidator, ValidatorSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Harness {
    service: RiskService,
    source: Arc<StaticAccountSource>,
    bus: Arc<MemoryAlertBus>,
    audit: Arc<MemoryAuditSink>,
    worker: JoinHandle<()>,
}

impl Harness {
    async fn new(accounts: Vec<AccountState>, policies: Vec<Policy>) -> Self {
        let bus = Arc::new(MemoryAlertBus::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let health = Arc::new(HealthState::new());
        let (alerts, worker) = AlertPublisher::spawn(
            bus.clone(),
            audit.clone(),
            AlertSettings::default(),
            health.clone(),
        );

        let cache = Arc::new(MetricCache::in_memory(CacheSettings::default()));
        cache.set_policies(policies).await.unwrap();
        let source = Arc::new(StaticAccountSource::with_accounts(accounts));
        let core = RiskCore::new(cache, alerts, Some(source.clone()), health, 10.0);

        let validator = PreTradeValidator::new(
            core.clone(),
            ValidatorSettings {
                check_budget: Duration::from_millis(500),
                cache_budget: Duration::from_millis(200),
            },
        );
        let monitor = Arc::new(RiskMonitor::new(core.clone(), MonitorSettings::default()));

        Self {
            service: RiskService::new(core, validator, monitor),
            source,
            bus,
            audit,
            worker,
        }
    }

    /// Drop every publisher handle and wait for delivery to finish
    async fn drain(self) -> (Arc<MemoryAlertBus>, Arc<MemoryAuditSink>) {
        drop(self.service);
        drop(self.source);
        self.worker.await.unwrap();
        (self.bus, self.audit)
    }
}

fn account(id: &str, equity: f64, margin_used: f64) -> AccountState {
    AccountState {
        account_id: id.to_string(),
        equity,
        balance: equity,
        available_margin: equity - margin_used,
        margin_used,
        unrealized_pnl: 0.0,
        peak_equity: equity,
        daily_start_equity: equity,
        positions: vec![],
        pending_orders: vec![],
        as_of: Utc::now(),
    }
}

fn buy(id: &str, account_id: &str, symbol: &str, quantity: f64, price: f64) -> OrderRequest {
    OrderRequest {
        order_id: id.to_string(),
        account_id: account_id.to_string(),
        symbol: symbol.to_string(),
        side: Side::Buy,
        quantity,
        price: Some(price),
        order_type: OrderType::Limit,
        strategy_id: None,
    }
}

#[tokio::test]
async fn test_margin_exhausting_order_rejected() {
    let harness = Harness::new(vec![account("acc-1", 10_000.0, 1_000.0)], default_policies()).await;

    // 100k notional at 10x consumes another 10k of margin: 11k used, ratio ~0.91
    let decision = harness
        .service
        .check_order(&buy("o-1", "acc-1", "BTCUSDT", 2.0, 50_000.0))
        .await;

    assert!(!decision.approved);
    let reason = decision.reason.unwrap();
    assert!(reason.contains("Min Margin Ratio"), "{reason}");
    let ratio = decision.metrics.margin_ratio.unwrap();
    assert!((ratio - 10_000.0 / 11_000.0).abs() < 1e-9);

    let (bus, audit) = harness.drain().await;
    assert_eq!(bus.count_on("risk.alerts.critical"), 1);
    assert_eq!(audit.records().len(), 1);
}

#[tokio::test]
async fn test_drawdown_halts_trading_until_re_enabled() {
    let mut state = account("acc-1", 7_000.0, 500.0);
    state.peak_equity = 10_000.0;
    let harness = Harness::new(vec![state], default_policies()).await;

    let order = buy("o-1", "acc-1", "ETHUSDT", 0.1, 3_000.0);
    let first = harness.service.check_order(&order).await;
    assert!(!first.approved);
    assert!(first.reason.unwrap().contains("Max Drawdown"));

    let status = harness.service.emergency_stop_status().unwrap();
    assert_eq!(status.triggered_by, "system:policy-engine");

    let halted = harness.service.check_order(&order).await;
    assert_eq!(halted.reason.as_deref(), Some("trading halted: Max Drawdown"));

    // Equity recovers, an operator clears the stop
    harness.source.upsert(account("acc-1", 10_000.0, 500.0)).await;
    harness.service.core().cache.set_account_state(&account("acc-1", 10_000.0, 500.0)).await.unwrap();
    harness
        .service
        .re_enable_trading("ops:alice", "drawdown investigated")
        .unwrap();

    let resumed = harness.service.check_order(&buy("o-2", "acc-1", "ETHUSDT", 0.1, 3_000.0)).await;
    assert!(resumed.approved, "{:?}", resumed.reason);

    let (bus, _) = harness.drain().await;
    // Violation, stop and clear
    assert_eq!(bus.count_on("risk.alerts.emergency"), 3);
}

#[tokio::test]
async fn test_repeated_violations_are_deduplicated_but_audited() {
    let harness = Harness::new(vec![account("acc-1", 1_000.0, 100.0)], default_policies()).await;

    for i in 0..3 {
        let decision = harness
            .service
            .check_order(&buy(&format!("o-{i}"), "acc-1", "BTCUSDT", 1.0, 50_000.0))
            .await;
        assert!(!decision.approved);
    }

    let (bus, audit) = harness.drain().await;
    assert_eq!(bus.count_on("risk.alerts.critical"), 1);
    let violations = audit
        .records()
        .into_iter()
        .filter(|r| matches!(r, AlertEvent::Violation(_)))
        .count();
    assert_eq!(violations, 3);
}

#[tokio::test]
async fn test_monitor_publishes_metrics_snapshot() {
    let mut state = account("acc-1", 10_000.0, 500.0);
    state.positions.push(Position {
        symbol: "ETHUSDT".to_string(),
        quantity: 1.0,
        entry_price: 3_000.0,
        current_price: 3_000.0,
        unrealized_pnl: 0.0,
        realized_pnl: 0.0,
        margin_used: 300.0,
    });
    let harness = Harness::new(vec![state], default_policies()).await;

    let summary = harness.service.monitor().tick().await;
    assert_eq!(summary.accounts_checked, 1);

    let metrics = harness.service.get_risk_metrics("acc-1").await.unwrap();
    assert!((metrics.leverage - 0.3).abs() < 1e-9);
    assert!(metrics.limit_utilization.contains_key("default-leverage"));

    let (bus, _) = harness.drain().await;
    assert_eq!(bus.count_on("risk.metrics"), 1);
}

#[test]
fn test_config_example_parses() {
    let config = Config::parse(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.risk.check_budget_ms, 5);
    assert_eq!(config.alerts.topic_prefix, "risk");
}
