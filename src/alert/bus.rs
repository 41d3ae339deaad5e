//! Alert bus and audit sink implementations

use super::{AlertError, AlertEvent};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use parking_lot::Mutex;

/// Destination for serialized alerts
#[async_trait]
pub trait AlertBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), AlertError>;
}

/// Durable record of violations and emergency stops
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Writes alerts to the structured log
#[derive(Debug, Default)]
pub struct LogAlertBus;

#[async_trait]
impl AlertBus for LogAlertBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), AlertError> {
        tracing::info!(target: "risk_guard::alerts", topic = %topic, payload = %payload, "Alert");
        Ok(())
    }
}

/// Publishes alerts with Redis PUBLISH
pub struct RedisAlertBus {
    conn: MultiplexedConnection,
}

impl RedisAlertBus {
    pub async fn connect(url: &str) -> Result<Self, AlertError> {
        let client = redis::Client::open(url).map_err(|e| AlertError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AlertError::Unavailable(e.to_string()))?;
        tracing::info!("Alert bus connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl AlertBus for RedisAlertBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), AlertError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(topic, payload)
            .await
            .map_err(|e| AlertError::Unavailable(e.to_string()))
    }
}

/// Keeps published alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAlertBus {
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryAlertBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published `(topic, payload)` pairs in order
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    pub fn count_on(&self, topic: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .count()
    }
}

#[async_trait]
impl AlertBus for MemoryAlertBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), AlertError> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Audit sink that writes one structured log line per record
#[derive(Debug, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let payload = serde_json::to_string(event).map_err(|e| AlertError::Encode(e.to_string()))?;
        tracing::info!(target: "risk_guard::audit", record = %payload, "Audit");
        Ok(())
    }
}

/// Audit sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AlertEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AlertEvent> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AlertEvent) -> Result<(), AlertError> {
        self.records.lock().push(event.clone());
        Ok(())
    }
}
