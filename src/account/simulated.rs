//! Simulated account source for dry runs without an account service

use super::{AccountError, AccountSource, AccountState};
use async_trait::async_trait;
use chrono::Utc;

/// Serves a fixed, healthy account snapshot for any requested id.
///
/// Only wired in when `service.simulation_mode` is enabled; startup logs a
/// warning because every decision is then made against fabricated data.
pub struct SimulatedAccountSource {
    accounts: Vec<String>,
}

impl SimulatedAccountSource {
    pub fn new(accounts: Vec<String>) -> Self {
        Self { accounts }
    }

    fn snapshot(account_id: &str) -> AccountState {
        AccountState {
            account_id: account_id.to_string(),
            equity: 100_000.0,
            balance: 100_000.0,
            available_margin: 90_000.0,
            margin_used: 10_000.0,
            unrealized_pnl: 0.0,
            peak_equity: 105_000.0,
            daily_start_equity: 98_000.0,
            positions: vec![],
            pending_orders: vec![],
            as_of: Utc::now(),
        }
    }
}

#[async_trait]
impl AccountSource for SimulatedAccountSource {
    async fn get_account_state(&self, account_id: &str) -> Result<AccountState, AccountError> {
        tracing::warn!(account = %account_id, "Serving simulated account state");
        Ok(Self::snapshot(account_id))
    }

    async fn active_accounts(&self) -> Result<Vec<String>, AccountError> {
        Ok(self.accounts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_snapshot_is_consistent() {
        let source = SimulatedAccountSource::new(vec!["sim-1".to_string()]);
        let state = source.get_account_state("anything").await.unwrap();
        assert!(state.validate().is_ok());
        assert_eq!(state.account_id, "anything");
        assert_eq!(source.active_accounts().await.unwrap(), vec!["sim-1"]);
    }
}
