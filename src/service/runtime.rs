//! Startup wiring
//!
//! Builds collaborators from configuration, loads the initial policy set and
//! spawns the background tasks.

use super::{PolicyRefresher, RiskService};
use crate::account::{AccountSource, HttpAccountConfig, HttpAccountSource, SimulatedAccountSource};
use crate::alert::{AlertBus, AlertPublisher, LogAlertBus, LogAuditSink, RedisAlertBus};
use crate::cache::{MemorySharedCache, MetricCache, RedisSharedCache, SharedCache};
use crate::components::RiskCore;
use crate::config::Config;
use crate::health::{Component, HealthState};
use crate::monitor::{MonitorSettings, RiskMonitor};
use crate::policy::{default_policies, FilePolicyStore, PolicyStore, StaticPolicyStore};
use crate::validator::{PreTradeValidator, ValidatorSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A started service and its background tasks
pub struct Runtime {
    pub service: Arc<RiskService>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    alert_worker: JoinHandle<()>,
}

impl Runtime {
    /// Receiver that flips to true on shutdown, for the HTTP server
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop background tasks and drain pending alerts
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }

        // The worker exits once every publisher handle is gone.
        drop(self.service);
        if tokio::time::timeout(Duration::from_secs(2), self.alert_worker)
            .await
            .is_err()
        {
            tracing::warn!("Alert worker did not drain before shutdown");
        }
        tracing::info!("Risk service stopped");
    }
}

/// Build and start the service described by `config`
pub async fn start(config: &Config) -> anyhow::Result<Runtime> {
    let health = Arc::new(HealthState::new());

    let shared: Arc<dyn SharedCache> = match &config.cache.redis_url {
        Some(url) => match RedisSharedCache::connect(url).await {
            Ok(cache) => {
                health.record_success(Component::SharedCache);
                Arc::new(cache)
            }
            Err(e) => {
                health.record_failure(Component::SharedCache, &e);
                tracing::warn!(error = %e, "Redis cache unavailable, using in-process shared tier");
                Arc::new(MemorySharedCache::new())
            }
        },
        None => Arc::new(MemorySharedCache::new()),
    };
    let cache = Arc::new(MetricCache::new(config.cache.settings(), shared, health.clone()));

    let bus: Arc<dyn AlertBus> = match &config.alerts.redis_url {
        Some(url) => match RedisAlertBus::connect(url).await {
            Ok(bus) => {
                health.record_success(Component::AlertBus);
                Arc::new(bus)
            }
            Err(e) => {
                health.record_failure(Component::AlertBus, &e);
                tracing::warn!(error = %e, "Redis alert bus unavailable, alerts go to the log");
                Arc::new(LogAlertBus)
            }
        },
        None => Arc::new(LogAlertBus),
    };
    let (alerts, alert_worker) = AlertPublisher::spawn(
        bus,
        Arc::new(LogAuditSink),
        config.alerts.settings(),
        health.clone(),
    );

    let accounts = account_source(config)?;

    let store: Arc<dyn PolicyStore> = match &config.sources.policy_file {
        Some(path) => Arc::new(FilePolicyStore::new(path)),
        None => {
            tracing::warn!("No policy file configured, using the default policy set");
            Arc::new(StaticPolicyStore::new(default_policies()))
        }
    };
    let refresher = PolicyRefresher::new(store, cache.clone(), health.clone());
    if let Err(e) = refresher.refresh_once().await {
        tracing::warn!(error = %e, "Initial policy load failed, installing default policies");
        if let Err(e) = cache.set_policies(default_policies()).await {
            tracing::debug!(error = %e, "Default policies not written to shared cache");
        }
    }

    let core = RiskCore::new(
        cache,
        alerts,
        accounts,
        health,
        config.risk.margin_leverage,
    );
    let validator = PreTradeValidator::new(
        core.clone(),
        ValidatorSettings {
            check_budget: config.risk.check_budget(),
            cache_budget: config.risk.cache_budget(),
        },
    );
    let monitor = Arc::new(RiskMonitor::new(
        core.clone(),
        MonitorSettings {
            interval: config.risk.monitor_interval(),
            fetch_timeout: config.sources.account_timeout(),
            breaker_threshold: config.risk.breaker_threshold,
            breaker_window: config.risk.breaker_window(),
            watched: config.risk.accounts.clone(),
        },
    ));

    let (shutdown, shutdown_rx) = watch::channel(false);
    let tasks = vec![
        tokio::spawn(monitor.clone().run(shutdown_rx.clone())),
        tokio::spawn(monitor.clone().run_daily_rollover(shutdown_rx.clone())),
        tokio::spawn(refresher.run(config.risk.policy_refresh(), shutdown_rx)),
    ];

    tracing::info!(
        monitor_interval_ms = config.risk.monitor_interval_ms,
        check_budget_ms = config.risk.check_budget_ms,
        "Risk service started"
    );

    Ok(Runtime {
        service: Arc::new(RiskService::new(core, validator, monitor)),
        shutdown,
        tasks,
        alert_worker,
    })
}

fn account_source(config: &Config) -> anyhow::Result<Option<Arc<dyn AccountSource>>> {
    if let Some(url) = &config.sources.account_url {
        let source = HttpAccountSource::new(HttpAccountConfig {
            base_url: url.clone(),
            timeout: config.sources.account_timeout(),
        })?;
        return Ok(Some(Arc::new(source)));
    }
    if config.service.simulation_mode {
        tracing::warn!("SIMULATION MODE: risk decisions use synthetic account data");
        return Ok(Some(Arc::new(SimulatedAccountSource::new(
            config.risk.accounts.clone(),
        ))));
    }
    tracing::warn!("No account source configured, only cached account state is available");
    Ok(None)
}
