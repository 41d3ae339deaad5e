//! Metric cache
//!
//! Two tiers in front of the collaborators: an in-process tier with short
//! TTLs and a shared tier (Redis or in-memory) bounded by a strict timeout.
//! Misses surface as `None`; callers decide the fallback. The local tier
//! keeps expired entries so a last-known value is always available after
//! the first successful load.

mod local;
mod redis_cache;
mod shared;

pub use local::{LocalTier, Lookup};
pub use redis_cache::RedisSharedCache;
pub use shared::{MemorySharedCache, SharedCache};

use crate::account::AccountState;
use crate::health::{Component, HealthState};
use crate::policy::Policy;
use crate::telemetry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const POLICIES_KEY: &str = "policies";
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Shared cache unavailable: {0}")]
    Unavailable(String),
    #[error("Shared cache timed out")]
    Timeout,
    #[error("Failed to encode cache entry: {0}")]
    Encode(String),
    #[error("Failed to decode cache entry {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Cache TTLs and shared-tier timeout
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub local_ttl: Duration,
    pub policy_ttl: Duration,
    pub shared_ttl: Duration,
    pub shared_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_millis(2_000),
            policy_ttl: Duration::from_secs(60),
            shared_ttl: Duration::from_secs(5),
            shared_timeout: Duration::from_millis(1),
        }
    }
}

fn price_key(symbol: &str) -> String {
    format!("price:{symbol}")
}

fn account_key(account_id: &str) -> String {
    format!("account:{account_id}")
}

/// Policies, prices and account states for the hot path
pub struct MetricCache {
    settings: CacheSettings,
    policies: LocalTier<Arc<Vec<Policy>>>,
    prices: LocalTier<f64>,
    accounts: LocalTier<AccountState>,
    shared: Arc<dyn SharedCache>,
    health: Arc<HealthState>,
}

impl MetricCache {
    pub fn new(settings: CacheSettings, shared: Arc<dyn SharedCache>, health: Arc<HealthState>) -> Self {
        Self {
            policies: LocalTier::new(settings.policy_ttl),
            prices: LocalTier::new(settings.local_ttl),
            accounts: LocalTier::new(settings.local_ttl),
            settings,
            shared,
            health,
        }
    }

    /// Cache with an in-memory shared tier
    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(
            settings,
            Arc::new(MemorySharedCache::new()),
            Arc::new(HealthState::new()),
        )
    }

    // --- policies ---

    /// Fresh policy set from the local or shared tier
    pub async fn get_policies(&self) -> Option<Arc<Vec<Policy>>> {
        if let Some(policies) = self.policies.get(POLICIES_KEY).fresh() {
            telemetry::record_cache_lookup("policies", "local");
            return Some(policies);
        }

        let policies: Vec<Policy> = self.shared_get_json(POLICIES_KEY).await?;
        telemetry::record_cache_lookup("policies", "shared");
        let policies = Arc::new(policies);
        self.policies.insert(POLICIES_KEY, Arc::clone(&policies));
        Some(policies)
    }

    /// Last loaded policy set regardless of age
    pub fn last_known_policies(&self) -> Option<Arc<Vec<Policy>>> {
        self.policies.get(POLICIES_KEY).any()
    }

    /// Replace the whole policy set. The local tier is updated even if the
    /// shared write fails.
    pub async fn set_policies(&self, policies: Vec<Policy>) -> Result<(), CacheError> {
        let policies = Arc::new(policies);
        self.policies.insert(POLICIES_KEY, Arc::clone(&policies));
        let ttl = self.settings.policy_ttl.max(self.settings.shared_ttl);
        self.shared_set_json(POLICIES_KEY, policies.as_ref(), ttl).await
    }

    // --- prices ---

    pub async fn get_price(&self, symbol: &str) -> Option<f64> {
        self.get_prices(&[symbol.to_string()]).await.remove(symbol)
    }

    /// Best available price per symbol: fresh local, then shared, then the
    /// last known local value. Unknown symbols are absent from the map.
    pub async fn get_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut found = HashMap::with_capacity(symbols.len());
        let mut missing = Vec::new();
        let mut stale = HashMap::new();

        for symbol in symbols {
            match self.prices.get(symbol) {
                Lookup::Fresh(p) => {
                    found.insert(symbol.clone(), p);
                }
                Lookup::Stale(p) => {
                    stale.insert(symbol.clone(), p);
                    missing.push(symbol.clone());
                }
                Lookup::Missing => missing.push(symbol.clone()),
            }
        }
        if !found.is_empty() {
            telemetry::record_cache_lookup("price", "local");
        }
        if missing.is_empty() {
            return found;
        }

        let keys: Vec<String> = missing.iter().map(|s| price_key(s)).collect();
        if let Some(values) = self.shared_get_many(&keys).await {
            for (symbol, raw) in missing.iter().zip(values) {
                let Some(price) = raw.and_then(|r| r.parse::<f64>().ok()) else {
                    continue;
                };
                telemetry::record_cache_lookup("price", "shared");
                self.prices.insert(symbol, price);
                found.insert(symbol.clone(), price);
            }
        }

        for symbol in missing {
            if found.contains_key(&symbol) {
                continue;
            }
            match stale.remove(&symbol) {
                Some(price) => {
                    telemetry::record_cache_lookup("price", "stale");
                    found.insert(symbol, price);
                }
                None => telemetry::record_cache_lookup("price", "miss"),
            }
        }
        found
    }

    pub async fn set_price(&self, symbol: &str, price: f64) -> Result<(), CacheError> {
        self.prices.insert(symbol, price);
        self.shared_set_raw(&price_key(symbol), price.to_string(), self.settings.shared_ttl)
            .await
    }

    // --- account states ---

    /// Fresh account state from the local or shared tier
    pub async fn get_account_state(&self, account_id: &str) -> Option<AccountState> {
        if let Some(state) = self.accounts.get(account_id).fresh() {
            telemetry::record_cache_lookup("account", "local");
            return Some(state);
        }
        let state: AccountState = self.shared_get_json(&account_key(account_id)).await?;
        telemetry::record_cache_lookup("account", "shared");
        self.accounts.insert(account_id, state.clone());
        Some(state)
    }

    /// Last cached account state regardless of age
    pub fn last_known_account_state(&self, account_id: &str) -> Option<AccountState> {
        self.accounts.get(account_id).any()
    }

    pub async fn set_account_state(&self, state: &AccountState) -> Result<(), CacheError> {
        self.accounts.insert(&state.account_id, state.clone());
        self.shared_set_json(&account_key(&state.account_id), state, self.settings.shared_ttl)
            .await
    }

    /// Populate only the local tier, for refills on the hot path
    pub fn remember_account_state(&self, state: &AccountState) {
        self.accounts.insert(&state.account_id, state.clone());
    }

    /// Accounts with any cached state
    pub fn cached_account_ids(&self) -> Vec<String> {
        let mut ids = self.accounts.keys();
        ids.sort();
        ids
    }

    // --- shared tier plumbing ---

    async fn shared_get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match tokio::time::timeout(self.settings.shared_timeout, self.shared.get(key)).await {
            Ok(Ok(raw)) => {
                self.mark_shared_healthy();
                raw?
            }
            Ok(Err(e)) => {
                self.health.record_failure(Component::SharedCache, &e);
                return None;
            }
            Err(_) => {
                tracing::trace!(key = %key, "Shared cache read timed out");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = CacheError::Decode {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "Discarding undecodable shared cache entry");
                None
            }
        }
    }

    async fn shared_get_many(&self, keys: &[String]) -> Option<Vec<Option<String>>> {
        match tokio::time::timeout(self.settings.shared_timeout, self.shared.get_many(keys)).await {
            Ok(Ok(values)) => {
                self.mark_shared_healthy();
                Some(values)
            }
            Ok(Err(e)) => {
                self.health.record_failure(Component::SharedCache, &e);
                None
            }
            Err(_) => None,
        }
    }

    async fn shared_set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value).map_err(|e| CacheError::Encode(e.to_string()))?;
        self.shared_set_raw(key, payload, ttl).await
    }

    async fn shared_set_raw(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let write_timeout = self.settings.shared_timeout.max(MIN_WRITE_TIMEOUT);
        let result = match tokio::time::timeout(write_timeout, self.shared.set(key, payload, ttl)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        };
        match &result {
            Ok(()) => self.mark_shared_healthy(),
            Err(e) => self.health.record_failure(Component::SharedCache, e),
        }
        result
    }

    fn mark_shared_healthy(&self) {
        if !self.health.is_healthy(Component::SharedCache) {
            self.health.record_success(Component::SharedCache);
        }
    }
}
