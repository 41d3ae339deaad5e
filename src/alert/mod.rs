//! Alert module
//!
//! Fire-and-forget publication of violations, emergency stops and metric
//! snapshots, with deduplication and an audit trail

mod bus;
mod dedup;
mod publisher;
mod types;

pub use bus::{
    AlertBus, AuditSink, LogAlertBus, LogAuditSink, MemoryAlertBus, MemoryAuditSink,
    RedisAlertBus,
};
pub use dedup::AlertDeduplicator;
pub use publisher::{AlertPublisher, AlertSettings};
pub use types::{AlertError, AlertEvent, AlertTopic};
