//! Emergency stop types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Emergency stop errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmergencyError {
    /// Re-enable requested while trading is running
    #[error("Trading is not stopped")]
    NotStopped,
    /// Re-enable requested without an operator identity
    #[error("Re-enable requires an authorizing operator")]
    MissingAuthorization,
}

/// Global trading state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingState {
    Running,
    Stopped,
}

/// Lifecycle of a stop record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Active,
    Cleared,
}

/// Audit record of one emergency stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStopRecord {
    pub id: Uuid,
    pub reason: String,
    pub triggered_by: String,
    pub status: StopStatus,
    pub trigger_time: DateTime<Utc>,
    /// Unwind progress reported by the executor that flattens the book
    pub orders_canceled: u32,
    pub positions_closed: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub clear_time: Option<DateTime<Utc>>,
    pub cleared_by: Option<String>,
    pub clear_reason: Option<String>,
}

impl EmergencyStopRecord {
    pub fn new(reason: &str, triggered_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason: reason.to_string(),
            triggered_by: triggered_by.to_string(),
            status: StopStatus::Active,
            trigger_time: Utc::now(),
            orders_canceled: 0,
            positions_closed: 0,
            completed: false,
            completed_at: None,
            clear_time: None,
            cleared_by: None,
            clear_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StopStatus::Active
    }
}
