//! Shared cache tier abstraction

use super::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// A cache shared between service instances
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

/// Process-local stand-in for the shared tier
#[derive(Default)]
pub struct MemorySharedCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str, now: Instant) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone())
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let now = Instant::now();
        Ok(keys.iter().map(|key| self.live(key, now)).collect())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires)| *expires > now);
        self.entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}
