//! Collaborator health tracking
//!
//! Degraded collaborators never halt trading by themselves; they show up in
//! the health report so operators can act.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use parking_lot::RwLock;

/// External collaborators whose availability is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    PolicyStore,
    AccountSource,
    SharedCache,
    AlertBus,
}

/// Last observed outcome for one collaborator
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Overall service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Health snapshot served by `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub emergency_stop_active: bool,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Shared health registry
#[derive(Debug, Default)]
pub struct HealthState {
    components: RwLock<BTreeMap<Component, ComponentHealth>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, component: Component) {
        let mut components = self.components.write();
        let entry = components.entry(component).or_default();
        entry.healthy = true;
        entry.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, component: Component, error: impl ToString) {
        let error = error.to_string();
        let mut components = self.components.write();
        let entry = components.entry(component).or_default();
        if entry.healthy || entry.last_failure.is_none() {
            tracing::warn!(component = ?component, error = %error, "Collaborator degraded");
        }
        entry.healthy = false;
        entry.last_failure = Some(Utc::now());
        entry.last_error = Some(error);
    }

    pub fn is_healthy(&self, component: Component) -> bool {
        self.components
            .read()
            .get(&component)
            .map(|c| c.healthy)
            .unwrap_or(true)
    }

    /// Build a report. Components never observed count as healthy.
    pub fn report(&self, emergency_stop_active: bool) -> HealthReport {
        let components = self.components.read().clone();
        let status = if components.values().all(|c| c.healthy) {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            emergency_stop_active,
            components,
        }
    }
}
