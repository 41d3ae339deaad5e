//! Emergency stop controller
//!
//! `is_stopped` is a single atomic load so every validator thread can read it
//! without contention. Transitions are serialized by the history lock; the
//! active record is swapped in before the flag is raised, so a reader that
//! observes `Stopped` can also read the record that caused it.

use super::{EmergencyError, EmergencyStopRecord, StopStatus, TradingState};
use crate::alert::{AlertEvent, AlertPublisher};
use crate::telemetry;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global halt switch shared by every component
pub struct EmergencyStopController {
    stopped: AtomicBool,
    active: RwLock<Option<Arc<EmergencyStopRecord>>>,
    history: Mutex<Vec<EmergencyStopRecord>>,
    alerts: AlertPublisher,
}

impl EmergencyStopController {
    pub fn new(alerts: AlertPublisher) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            active: RwLock::new(None),
            history: Mutex::new(Vec::new()),
            alerts,
        }
    }

    /// Lock-free check used on every order
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TradingState {
        if self.is_stopped() {
            TradingState::Stopped
        } else {
            TradingState::Running
        }
    }

    /// Halt all trading. Idempotent: while already stopped the first record
    /// is kept and `false` is returned.
    pub fn trigger(&self, reason: &str, triggered_by: &str) -> bool {
        let mut history = self.history.lock();
        if self.stopped.load(Ordering::SeqCst) {
            tracing::debug!(
                reason = %reason,
                triggered_by = %triggered_by,
                "Emergency stop already active"
            );
            return false;
        }

        let record = EmergencyStopRecord::new(reason, triggered_by);
        *self.active.write() = Some(Arc::new(record.clone()));
        self.stopped.store(true, Ordering::SeqCst);
        history.push(record.clone());
        drop(history);

        tracing::error!(
            stop_id = %record.id,
            reason = %reason,
            triggered_by = %triggered_by,
            "EMERGENCY STOP: all trading halted"
        );
        telemetry::record_emergency_stop();
        telemetry::set_emergency_active(true);
        self.alerts.publish(AlertEvent::EmergencyStop(record));
        true
    }

    /// Record how far the unwind of open orders and positions has got
    pub fn update_progress(
        &self,
        orders_canceled: u32,
        positions_closed: u32,
    ) -> Result<EmergencyStopRecord, EmergencyError> {
        let record = self.modify_active(|record| {
            record.orders_canceled = orders_canceled;
            record.positions_closed = positions_closed;
        })?;
        tracing::info!(
            stop_id = %record.id,
            orders_canceled,
            positions_closed,
            "Emergency unwind progress"
        );
        Ok(record)
    }

    /// Mark the unwind finished. Repeated calls keep the first completion
    /// time.
    pub fn complete(&self) -> Result<EmergencyStopRecord, EmergencyError> {
        let record = self.modify_active(|record| {
            if !record.completed {
                record.completed = true;
                record.completed_at = Some(Utc::now());
            }
        })?;
        let elapsed_ms = record
            .completed_at
            .map(|done| (done - record.trigger_time).num_milliseconds())
            .unwrap_or_default();
        tracing::warn!(
            stop_id = %record.id,
            orders_canceled = record.orders_canceled,
            positions_closed = record.positions_closed,
            elapsed_ms,
            "Emergency unwind completed"
        );
        Ok(record)
    }

    /// Resume trading after a human decision
    pub fn re_enable(
        &self,
        authorized_by: &str,
        reason: &str,
    ) -> Result<EmergencyStopRecord, EmergencyError> {
        let mut history = self.history.lock();
        if !self.stopped.load(Ordering::SeqCst) {
            return Err(EmergencyError::NotStopped);
        }
        if authorized_by.trim().is_empty() {
            return Err(EmergencyError::MissingAuthorization);
        }

        let mut active = self.active.write();
        let mut cleared = match active.as_deref() {
            Some(record) => record.clone(),
            None => EmergencyStopRecord::new("unknown", "unknown"),
        };
        cleared.status = StopStatus::Cleared;
        cleared.clear_time = Some(Utc::now());
        cleared.cleared_by = Some(authorized_by.to_string());
        cleared.clear_reason = Some(reason.to_string());

        self.stopped.store(false, Ordering::SeqCst);
        *active = None;
        drop(active);

        if let Some(entry) = history.iter_mut().rev().find(|r| r.id == cleared.id) {
            *entry = cleared.clone();
        }
        drop(history);

        if !cleared.completed {
            tracing::warn!(stop_id = %cleared.id, "Re-enabling before the unwind reported completion");
        }
        tracing::warn!(
            stop_id = %cleared.id,
            authorized_by = %authorized_by,
            reason = %reason,
            "Trading re-enabled"
        );
        telemetry::set_emergency_active(false);
        self.alerts.publish(AlertEvent::EmergencyCleared(cleared.clone()));
        Ok(cleared)
    }

    /// The active stop record, if trading is halted
    pub fn status(&self) -> Option<EmergencyStopRecord> {
        self.active.read().as_deref().cloned()
    }

    /// Reason for the current halt, if any
    pub fn halt_reason(&self) -> Option<String> {
        if !self.is_stopped() {
            return None;
        }
        Some(
            self.status()
                .map(|r| r.reason)
                .unwrap_or_else(|| "emergency stop active".to_string()),
        )
    }

    /// Every stop ever triggered, oldest first
    pub fn history(&self) -> Vec<EmergencyStopRecord> {
        self.history.lock().clone()
    }

    fn modify_active(
        &self,
        update: impl FnOnce(&mut EmergencyStopRecord),
    ) -> Result<EmergencyStopRecord, EmergencyError> {
        let mut history = self.history.lock();
        let mut active = self.active.write();
        let Some(current) = active.as_deref() else {
            return Err(EmergencyError::NotStopped);
        };
        let mut record = current.clone();
        update(&mut record);

        *active = Some(Arc::new(record.clone()));
        if let Some(entry) = history.iter_mut().rev().find(|r| r.id == record.id) {
            *entry = record.clone();
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> EmergencyStopController {
        EmergencyStopController::new(AlertPublisher::disabled())
    }

    #[test]
    fn test_starts_running() {
        let c = controller();
        assert!(!c.is_stopped());
        assert_eq!(c.state(), TradingState::Running);
        assert!(c.status().is_none());
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let c = controller();
        assert!(c.trigger("drawdown", "system:policy-engine"));
        assert!(!c.trigger("second", "operator"));

        let status = c.status().unwrap();
        assert_eq!(status.reason, "drawdown");
        assert_eq!(status.triggered_by, "system:policy-engine");
        assert_eq!(c.history().len(), 1);
    }

    #[test]
    fn test_re_enable_requires_stopped() {
        let c = controller();
        assert_eq!(c.re_enable("ops", "test"), Err(EmergencyError::NotStopped));
    }

    #[test]
    fn test_re_enable_requires_operator() {
        let c = controller();
        c.trigger("manual", "ops");
        assert_eq!(
            c.re_enable("  ", "resume"),
            Err(EmergencyError::MissingAuthorization)
        );
        assert!(c.is_stopped());
    }

    #[test]
    fn test_re_enable_clears_and_audits() {
        let c = controller();
        c.trigger("manual", "ops");
        let cleared = c.re_enable("alice", "root cause fixed").unwrap();

        assert!(!c.is_stopped());
        assert!(c.status().is_none());
        assert_eq!(cleared.cleared_by.as_deref(), Some("alice"));

        let history = c.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_active());
        assert_eq!(history[0].status, StopStatus::Cleared);
        assert!(history[0].clear_time.is_some());
        assert_eq!(history[0].clear_reason.as_deref(), Some("root cause fixed"));
    }

    #[test]
    fn test_progress_requires_active_stop() {
        let c = controller();
        assert_eq!(c.update_progress(1, 1), Err(EmergencyError::NotStopped));
        assert_eq!(c.complete(), Err(EmergencyError::NotStopped));
    }

    #[test]
    fn test_unwind_progress_and_completion() {
        let c = controller();
        c.trigger("drawdown", "system:policy-engine");

        let record = c.update_progress(12, 3).unwrap();
        assert_eq!((record.orders_canceled, record.positions_closed), (12, 3));
        assert!(!record.completed);

        let done = c.complete().unwrap();
        assert!(done.completed);
        let first_completion = done.completed_at.unwrap();
        assert!(first_completion >= done.trigger_time);
        assert_eq!(c.complete().unwrap().completed_at, Some(first_completion));

        let status = c.status().unwrap();
        assert_eq!(status.status, StopStatus::Active);
        assert_eq!(status.orders_canceled, 12);
        assert!(c.history()[0].completed);

        let cleared = c.re_enable("alice", "book flat").unwrap();
        assert!(cleared.completed);
        assert_eq!(cleared.positions_closed, 3);
    }

    #[test]
    fn test_concurrent_triggers_create_one_record() {
        let c = Arc::new(controller());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || c.trigger(&format!("reason-{i}"), "thread"))
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();

        assert_eq!(created, 1);
        assert_eq!(c.history().len(), 1);
        assert!(c.is_stopped());
    }
}
