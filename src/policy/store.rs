//! Policy stores
//!
//! Policies are read from a TOML document of `[[policies]]` tables. A load
//! either yields a fully valid active set or an error; the caller keeps its
//! last good set on error.

use super::{Operator, Policy, PolicyError, PolicyScope, PolicyType};
use crate::risk::Metric;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Trait for policy sources
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch every enabled policy
    async fn get_active_policies(&self) -> Result<Vec<Policy>, PolicyError>;
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policies: Vec<Policy>,
}

/// Parse and validate a TOML policy document, returning the enabled set
pub fn parse_policies(source: &str) -> Result<Vec<Policy>, PolicyError> {
    let document: PolicyDocument =
        toml::from_str(source).map_err(|e| PolicyError::Parse(e.to_string()))?;
    validate_all(document.policies)
}

fn validate_all(policies: Vec<Policy>) -> Result<Vec<Policy>, PolicyError> {
    let mut seen = std::collections::HashSet::new();
    for policy in &policies {
        policy.validate()?;
        if !seen.insert(policy.id.as_str()) {
            return Err(PolicyError::InvalidPolicy {
                id: policy.id.clone(),
                reason: "duplicate id".to_string(),
            });
        }
    }
    Ok(policies.into_iter().filter(|p| p.enabled).collect())
}

/// Policies read from a TOML file on every fetch
pub struct FilePolicyStore {
    path: PathBuf,
}

impl FilePolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn get_active_policies(&self) -> Result<Vec<Policy>, PolicyError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PolicyError::Unavailable(format!("{}: {e}", self.path.display())))?;
        parse_policies(&content)
    }
}

/// In-memory policy store
pub struct StaticPolicyStore {
    policies: RwLock<Vec<Policy>>,
}

impl StaticPolicyStore {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }

    /// Replace the stored set
    pub async fn replace(&self, policies: Vec<Policy>) {
        *self.policies.write().await = policies;
    }
}

#[async_trait]
impl PolicyStore for StaticPolicyStore {
    async fn get_active_policies(&self) -> Result<Vec<Policy>, PolicyError> {
        validate_all(self.policies.read().await.clone())
    }
}

/// Conservative built-in set used when no store is reachable at startup
pub fn default_policies() -> Vec<Policy> {
    vec![
        Policy {
            id: "default-leverage".to_string(),
            name: "Max Leverage".to_string(),
            policy_type: PolicyType::Hard,
            metric: Metric::Leverage,
            operator: Operator::Le,
            threshold: 10.0,
            scope: PolicyScope::Account,
            action: Some("reject_order".to_string()),
            enabled: true,
            priority: 100,
        },
        Policy {
            id: "default-margin".to_string(),
            name: "Min Margin Ratio".to_string(),
            policy_type: PolicyType::Hard,
            metric: Metric::MarginRatio,
            operator: Operator::Ge,
            threshold: 1.0,
            scope: PolicyScope::Account,
            action: Some("reject_order".to_string()),
            enabled: true,
            priority: 100,
        },
        Policy {
            id: "default-drawdown".to_string(),
            name: "Max Drawdown".to_string(),
            policy_type: PolicyType::Emergency,
            metric: Metric::DrawdownMax,
            operator: Operator::Le,
            threshold: 0.25,
            scope: PolicyScope::Account,
            action: Some("emergency_stop".to_string()),
            enabled: true,
            priority: 200,
        },
    ]
}
