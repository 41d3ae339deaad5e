//! Configuration types for risk-guard

use crate::alert::AlertSettings;
use crate::cache::CacheSettings;
use crate::service::AuthSettings;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Root configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub risk: RiskConfig,
    pub cache: CacheConfig,
    pub alerts: AlertConfig,
    pub sources: SourcesConfig,
    pub telemetry: TelemetryConfig,
}

/// Service surface configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address of the JSON/HTTP adapter
    pub http_addr: SocketAddr,
    /// Serve synthetic account data when no account source is configured
    pub simulation_mode: bool,
    /// Require `Authorization: Bearer <api_key>` on every route but /health
    pub auth_enabled: bool,
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8095)),
            simulation_mode: false,
            auth_enabled: true,
            api_key: None,
        }
    }
}

impl ServiceConfig {
    pub fn auth(&self) -> AuthSettings {
        AuthSettings {
            enabled: self.auth_enabled,
            api_key: self.api_key.clone(),
        }
    }
}

/// Risk evaluation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Risk monitor tick interval
    pub monitor_interval_ms: u64,
    /// Policy store refresh interval
    pub policy_refresh_secs: u64,
    /// Deadline for a single pre-trade check
    pub check_budget_ms: u64,
    /// Sub-budget for cache refills inside a check
    pub cache_budget_ms: u64,
    /// Leverage used to estimate margin consumed by a fill
    pub margin_leverage: f64,
    /// Hard violations that trip the monitor circuit breaker
    pub breaker_threshold: usize,
    /// Window over which `breaker_threshold` is counted
    pub breaker_window_secs: u64,
    /// Accounts always watched by the monitor
    pub accounts: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 1_000,
            policy_refresh_secs: 30,
            check_budget_ms: 5,
            cache_budget_ms: 2,
            margin_leverage: 10.0,
            breaker_threshold: 5,
            breaker_window_secs: 60,
            accounts: Vec::new(),
        }
    }
}

impl RiskConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn policy_refresh(&self) -> Duration {
        Duration::from_secs(self.policy_refresh_secs)
    }

    pub fn check_budget(&self) -> Duration {
        Duration::from_millis(self.check_budget_ms)
    }

    pub fn cache_budget(&self) -> Duration {
        Duration::from_millis(self.cache_budget_ms)
    }

    pub fn breaker_window(&self) -> Duration {
        Duration::from_secs(self.breaker_window_secs)
    }
}

/// Cache tier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub local_ttl_ms: u64,
    pub policy_ttl_ms: u64,
    pub shared_ttl_ms: u64,
    pub shared_timeout_ms: u64,
    /// Shared tier on Redis; in-process memory when absent
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_ms: 2_000,
            policy_ttl_ms: 60_000,
            shared_ttl_ms: 5_000,
            shared_timeout_ms: 1,
            redis_url: None,
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            local_ttl: Duration::from_millis(self.local_ttl_ms),
            policy_ttl: Duration::from_millis(self.policy_ttl_ms),
            shared_ttl: Duration::from_millis(self.shared_ttl_ms),
            shared_timeout: Duration::from_millis(self.shared_timeout_ms),
        }
    }
}

/// Alert pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub dedup_window_secs: u64,
    pub channel_capacity: usize,
    /// Publish to Redis; alerts go to the log when absent
    pub redis_url: Option<String>,
    pub topic_prefix: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 300,
            channel_capacity: 4_096,
            redis_url: None,
            topic_prefix: "risk".to_string(),
        }
    }
}

impl AlertConfig {
    pub fn settings(&self) -> AlertSettings {
        AlertSettings {
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            channel_capacity: self.channel_capacity,
            topic_prefix: self.topic_prefix.clone(),
        }
    }
}

/// Upstream collaborator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base URL of the account service
    pub account_url: Option<String>,
    pub account_timeout_ms: u64,
    /// TOML file of `[[policies]]`
    pub policy_file: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            account_url: None,
            account_timeout_ms: 250,
            policy_file: None,
        }
    }
}

impl SourcesConfig {
    pub fn account_timeout(&self) -> Duration {
        Duration::from_millis(self.account_timeout_ms)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when absent
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.risk.monitor_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "risk.monitor_interval_ms must be positive".to_string(),
            ));
        }
        if self.risk.check_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "risk.check_budget_ms must be positive".to_string(),
            ));
        }
        if self.risk.cache_budget_ms > self.risk.check_budget_ms {
            return Err(ConfigError::Invalid(
                "risk.cache_budget_ms cannot exceed risk.check_budget_ms".to_string(),
            ));
        }
        if !(self.risk.margin_leverage.is_finite() && self.risk.margin_leverage > 0.0) {
            return Err(ConfigError::Invalid(
                "risk.margin_leverage must be positive".to_string(),
            ));
        }
        if self.risk.breaker_threshold == 0 {
            return Err(ConfigError::Invalid(
                "risk.breaker_threshold must be positive".to_string(),
            ));
        }
        if self.service.simulation_mode && self.sources.account_url.is_some() {
            return Err(ConfigError::Invalid(
                "service.simulation_mode cannot be combined with sources.account_url".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.risk.monitor_interval(), Duration::from_secs(1));
        assert_eq!(config.risk.check_budget(), Duration::from_millis(5));
        assert_eq!(config.cache.shared_timeout_ms, 1);
        assert_eq!(config.alerts.topic_prefix, "risk");
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
        assert!(!config.service.simulation_mode);
        assert_eq!(config.service.http_addr.port(), 8095);
        assert!(config.service.auth_enabled);
        assert!(config.service.api_key.is_none());
    }

    #[test]
    fn test_auth_settings() {
        let config = Config::parse(
            r#"
            [service]
            api_key = "s3cret"
            "#,
        )
        .unwrap();
        let auth = config.service.auth();
        assert!(auth.enabled);
        assert_eq!(auth.api_key.as_deref(), Some("s3cret"));

        let open = Config::parse("[service]\nauth_enabled = false\n").unwrap();
        assert!(!open.service.auth().enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [risk]
            breaker_threshold = 3
            accounts = ["acc-1", "acc-2"]

            [cache]
            redis_url = "redis://127.0.0.1:6379"

            [telemetry]
            log_format = "json"
            metrics_port = 9100
            "#,
        )
        .unwrap();
        assert_eq!(config.risk.breaker_threshold, 3);
        assert_eq!(config.risk.breaker_window_secs, 60);
        assert_eq!(config.risk.accounts.len(), 2);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.telemetry.metrics_port, Some(9100));
    }

    #[test]
    fn test_cache_budget_cannot_exceed_check_budget() {
        let result = Config::parse(
            r#"
            [risk]
            check_budget_ms = 5
            cache_budget_ms = 10
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_simulation_excludes_account_url() {
        let result = Config::parse(
            r#"
            [service]
            simulation_mode = true

            [sources]
            account_url = "http://accounts:8080"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[risk]\nmargin_leverage = 20.0").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.risk.margin_leverage, 20.0);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../config.toml.example")).unwrap();
        assert!(config.sources.policy_file.is_some());
    }
}
