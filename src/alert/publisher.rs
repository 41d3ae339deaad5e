//! Non-blocking alert publisher
//!
//! Callers hand events to a bounded channel and return immediately. A single
//! worker task audits, deduplicates and forwards them to the bus.

use super::{AlertBus, AlertDeduplicator, AlertEvent, AuditSink};
use crate::health::{Component, HealthState};
use crate::policy::Violation;
use crate::telemetry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Publisher settings
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub dedup_window: Duration,
    pub channel_capacity: usize,
    pub topic_prefix: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(300),
            channel_capacity: 4096,
            topic_prefix: "risk".to_string(),
        }
    }
}

/// Cloneable handle used by every alert producer
#[derive(Clone)]
pub struct AlertPublisher {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertPublisher {
    /// Start the delivery worker and return the producer handle
    pub fn spawn(
        bus: Arc<dyn AlertBus>,
        audit: Arc<dyn AuditSink>,
        settings: AlertSettings,
        health: Arc<HealthState>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let worker = AlertWorker {
            bus,
            audit,
            dedup: AlertDeduplicator::new(settings.dedup_window),
            settings,
            health,
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    /// A publisher whose events go nowhere
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Enqueue an event without waiting. Returns false if it was dropped.
    pub fn publish(&self, event: AlertEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                telemetry::record_alert_dropped();
                match event {
                    AlertEvent::EmergencyStop(_) | AlertEvent::EmergencyCleared(_) => {
                        tracing::error!(topic = ?event.topic(), "Alert channel full, emergency alert dropped");
                    }
                    _ => tracing::warn!(topic = ?event.topic(), "Alert channel full, alert dropped"),
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Alert publisher disabled, event discarded");
                false
            }
        }
    }

    pub fn publish_violations(&self, violations: &[Violation]) {
        for violation in violations {
            self.publish(AlertEvent::Violation(violation.clone()));
        }
    }
}

struct AlertWorker {
    bus: Arc<dyn AlertBus>,
    audit: Arc<dyn AuditSink>,
    dedup: AlertDeduplicator,
    settings: AlertSettings,
    health: Arc<HealthState>,
}

impl AlertWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<AlertEvent>) {
        let purge_every = self.settings.dedup_window.max(Duration::from_secs(1));
        let mut purge = tokio::time::interval(purge_every);
        purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.deliver(event).await,
                        None => break,
                    }
                }
                _ = purge.tick() => {
                    let purged = self.dedup.purge(Instant::now());
                    if purged > 0 {
                        tracing::debug!(purged, "Purged alert dedup keys");
                    }
                }
            }
        }

        tracing::debug!("Alert worker stopped");
    }

    async fn deliver(&mut self, event: AlertEvent) {
        if event.is_auditable() {
            if let Err(e) = self.audit.record(&event).await {
                tracing::error!(error = %e, "Failed to write audit record");
            }
        }

        if let Some(key) = event.dedup_key() {
            if !self.dedup.should_send(&key, Instant::now()) {
                telemetry::record_alert_deduplicated();
                tracing::trace!(key = %key, "Alert suppressed as duplicate");
                return;
            }
        }

        let topic = event.topic().name(&self.settings.topic_prefix);
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, topic = %topic, "Failed to encode alert");
                return;
            }
        };

        match self.bus.publish(&topic, payload).await {
            Ok(()) => {
                self.health.record_success(Component::AlertBus);
                telemetry::record_alert_published(&topic);
            }
            Err(e) => {
                self.health.record_failure(Component::AlertBus, &e);
                tracing::warn!(error = %e, topic = %topic, "Failed to publish alert");
            }
        }
    }
}
