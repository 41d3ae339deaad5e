//! Emergency stop lifecycle integration tests

use risk_guard::alert::{AlertEvent, AlertPublisher, AlertSettings, MemoryAlertBus, MemoryAuditSink};
use risk_guard::emergency::{EmergencyError, EmergencyStopController, TradingState};
use risk_guard::health::HealthState;
use std::sync::Arc;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_trigger_re_enable_cycle_is_audited() {
    let bus = Arc::new(MemoryAlertBus::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let (alerts, worker) = AlertPublisher::spawn(
        bus.clone(),
        audit.clone(),
        AlertSettings::default(),
        Arc::new(HealthState::new()),
    );
    let controller = EmergencyStopController::new(alerts);

    assert!(controller.trigger("exchange outage", "ops:alice"));
    assert!(!controller.trigger("second opinion", "ops:bob"));
    assert_eq!(controller.state(), TradingState::Stopped);
    assert_eq!(controller.status().unwrap().reason, "exchange outage");

    let cleared = assert_ok!(controller.re_enable("ops:carol", "exchange recovered"));
    assert_eq!(cleared.cleared_by.as_deref(), Some("ops:carol"));
    assert_eq!(controller.state(), TradingState::Running);
    assert_eq!(
        controller.re_enable("ops:carol", "again").unwrap_err(),
        EmergencyError::NotStopped
    );

    let history = controller.history();
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_active());

    drop(controller);
    worker.await.unwrap();

    assert_eq!(bus.count_on("risk.alerts.emergency"), 2);
    let records = audit.records();
    assert!(matches!(records[0], AlertEvent::EmergencyStop(_)));
    assert!(matches!(records[1], AlertEvent::EmergencyCleared(_)));
}

#[tokio::test]
async fn test_concurrent_triggers_leave_one_record() {
    let controller = Arc::new(EmergencyStopController::new(AlertPublisher::disabled()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.trigger(&format!("reason {i}"), "system:test") })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(controller.history().len(), 1);
    assert!(controller.is_stopped());
}
