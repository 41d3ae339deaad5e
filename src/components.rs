//! Shared handles for the validator, monitor and service facade

use crate::account::AccountSource;
use crate::alert::AlertPublisher;
use crate::cache::MetricCache;
use crate::emergency::EmergencyStopController;
use crate::health::HealthState;
use crate::monitor::BaselineTracker;
use crate::policy::PolicyEngine;
use crate::risk::{OrderRateTracker, RiskCalculator};
use std::sync::Arc;

/// Components every risk path needs. Cloning is cheap: all state is behind
/// `Arc`s, so clones observe the same cache, halt flag and rate windows.
#[derive(Clone)]
pub struct RiskCore {
    pub cache: Arc<MetricCache>,
    pub emergency: Arc<EmergencyStopController>,
    pub engine: PolicyEngine,
    pub calculator: RiskCalculator,
    pub rates: Arc<OrderRateTracker>,
    /// Daily-start and peak equity, applied to every fresh account snapshot
    pub baselines: Arc<BaselineTracker>,
    pub alerts: AlertPublisher,
    pub accounts: Option<Arc<dyn AccountSource>>,
    pub health: Arc<HealthState>,
}

impl RiskCore {
    pub fn new(
        cache: Arc<MetricCache>,
        alerts: AlertPublisher,
        accounts: Option<Arc<dyn AccountSource>>,
        health: Arc<HealthState>,
        margin_leverage: f64,
    ) -> Self {
        let emergency = Arc::new(EmergencyStopController::new(alerts.clone()));
        Self {
            cache,
            engine: PolicyEngine::new(Arc::clone(&emergency)),
            emergency,
            calculator: RiskCalculator::new(margin_leverage),
            rates: Arc::new(OrderRateTracker::new()),
            baselines: Arc::new(BaselineTracker::new()),
            alerts,
            accounts,
            health,
        }
    }
}
