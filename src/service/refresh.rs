//! Policy refresh loop
//!
//! The single owner of the cached policy set. Each successful load replaces
//! the whole set; a failed load keeps serving the last good one.

use crate::cache::MetricCache;
use crate::health::{Component, HealthState};
use crate::policy::{PolicyError, PolicyStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct PolicyRefresher {
    store: Arc<dyn PolicyStore>,
    cache: Arc<MetricCache>,
    health: Arc<HealthState>,
}

impl PolicyRefresher {
    pub fn new(store: Arc<dyn PolicyStore>, cache: Arc<MetricCache>, health: Arc<HealthState>) -> Self {
        Self {
            store,
            cache,
            health,
        }
    }

    /// Load the active set once. Returns the number of policies installed.
    pub async fn refresh_once(&self) -> Result<usize, PolicyError> {
        let policies = match self.store.get_active_policies().await {
            Ok(policies) => policies,
            Err(e) => {
                self.health.record_failure(Component::PolicyStore, &e);
                tracing::warn!(error = %e, "Policy refresh failed, keeping last good set");
                return Err(e);
            }
        };
        self.health.record_success(Component::PolicyStore);

        let count = policies.len();
        if let Err(e) = self.cache.set_policies(policies).await {
            tracing::debug!(error = %e, "Policy set not written to shared cache");
        }
        tracing::debug!(count, "Policies refreshed");
        Ok(count)
    }

    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately and startup has already loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Policy refresh stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::policy::{default_policies, Policy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyStore {
        fail: AtomicBool,
    }

    #[async_trait]
    impl PolicyStore for FlakyStore {
        async fn get_active_policies(&self) -> Result<Vec<Policy>, PolicyError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(PolicyError::Unavailable("database down".to_string()))
            } else {
                Ok(default_policies())
            }
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_set() {
        let store = Arc::new(FlakyStore {
            fail: AtomicBool::new(false),
        });
        let cache = Arc::new(MetricCache::in_memory(CacheSettings::default()));
        let health = Arc::new(HealthState::new());
        let refresher = PolicyRefresher::new(store.clone(), cache.clone(), health.clone());

        assert_eq!(refresher.refresh_once().await.unwrap(), 3);
        assert!(health.is_healthy(Component::PolicyStore));

        store.fail.store(true, Ordering::SeqCst);
        assert!(refresher.refresh_once().await.is_err());
        assert!(!health.is_healthy(Component::PolicyStore));
        assert_eq!(cache.last_known_policies().unwrap().len(), 3);
    }
}
