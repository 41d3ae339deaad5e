//! In-process cache tier
//!
//! Entries outlive their TTL: an expired entry is reported as stale rather
//! than dropped, so callers can fall back to the last known value.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Result of a local lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    Stale(V),
    Missing,
}

impl<V> Lookup<V> {
    pub fn fresh(self) -> Option<V> {
        match self {
            Lookup::Fresh(v) => Some(v),
            _ => None,
        }
    }

    /// The value regardless of age
    pub fn any(self) -> Option<V> {
        match self {
            Lookup::Fresh(v) | Lookup::Stale(v) => Some(v),
            Lookup::Missing => None,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed local tier with a uniform TTL
#[derive(Debug)]
pub struct LocalTier<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> LocalTier<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Lookup<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Lookup<V> {
        match self.entries.get(key).as_deref() {
            Some(e) if now.saturating_duration_since(e.stored_at) < self.ttl => {
                Lookup::Fresh(e.value.clone())
            }
            Some(e) => Lookup::Stale(e.value.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: &str, value: V, now: Instant) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}
