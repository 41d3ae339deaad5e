//! Check command implementation
//!
//! Runs the pre-trade pipeline once against files on disk, without any
//! collaborators. Useful for trying out a policy file.

use crate::account::{AccountState, OrderRequest, StaticAccountSource};
use crate::alert::AlertPublisher;
use crate::cache::MetricCache;
use crate::components::RiskCore;
use crate::config::Config;
use crate::health::HealthState;
use crate::policy::{default_policies, parse_policies};
use crate::validator::{PreTradeValidator, ValidatorSettings};
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Account snapshot as JSON
    #[arg(long)]
    pub account: PathBuf,

    /// Order request as JSON
    #[arg(long)]
    pub order: PathBuf,

    /// Policy file; the default policy set when omitted
    #[arg(long)]
    pub policies: Option<PathBuf>,
}

impl CheckArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let account: AccountState = read_json(&self.account)?;
        account.validate()?;
        let order: OrderRequest = read_json(&self.order)?;

        let policies = match &self.policies {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                parse_policies(&content)?
            }
            None => default_policies(),
        };

        let cache = Arc::new(MetricCache::in_memory(config.cache.settings()));
        cache.set_policies(policies).await?;
        cache.set_account_state(&account).await?;
        for position in account.positions.iter().filter(|p| p.current_price > 0.0) {
            cache.set_price(&position.symbol, position.current_price).await?;
        }

        let core = RiskCore::new(
            cache,
            AlertPublisher::disabled(),
            Some(Arc::new(StaticAccountSource::with_accounts([account]))),
            Arc::new(HealthState::new()),
            config.risk.margin_leverage,
        );
        let validator = PreTradeValidator::new(
            core,
            ValidatorSettings {
                check_budget: Duration::from_secs(1),
                cache_budget: Duration::from_millis(500),
            },
        );

        let decision = validator.check_order(&order).await;
        println!("{}", serde_json::to_string_pretty(&decision)?);
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
