//! Account module
//!
//! Account/position/order types and the upstream account state sources

mod http;
mod simulated;
mod types;

pub use http::{HttpAccountConfig, HttpAccountSource};
pub use simulated::SimulatedAccountSource;
pub use types::{AccountError, AccountState, OrderRequest, OrderType, Position, Side};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for upstream account state providers
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Fetch the current state of one account
    async fn get_account_state(&self, account_id: &str) -> Result<AccountState, AccountError>;
    /// List accounts that should be monitored
    async fn active_accounts(&self) -> Result<Vec<String>, AccountError>;
}

/// In-memory account source, fed by callers
#[derive(Default)]
pub struct StaticAccountSource {
    accounts: RwLock<HashMap<String, AccountState>>,
}

impl StaticAccountSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-populated with the given states
    pub fn with_accounts(states: impl IntoIterator<Item = AccountState>) -> Self {
        let accounts = states
            .into_iter()
            .map(|s| (s.account_id.clone(), s))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Insert or replace an account state
    pub async fn upsert(&self, state: AccountState) {
        self.accounts
            .write()
            .await
            .insert(state.account_id.clone(), state);
    }

    pub async fn remove(&self, account_id: &str) -> Option<AccountState> {
        self.accounts.write().await.remove(account_id)
    }
}

#[async_trait]
impl AccountSource for StaticAccountSource {
    async fn get_account_state(&self, account_id: &str) -> Result<AccountState, AccountError> {
        self.accounts
            .read()
            .await
            .get(account_id)
            .cloned()
            .ok_or_else(|| AccountError::NotFound(account_id.to_string()))
    }

    async fn active_accounts(&self) -> Result<Vec<String>, AccountError> {
        let mut ids: Vec<String> = self.accounts.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn flat(id: &str) -> AccountState {
        AccountState {
            account_id: id.to_string(),
            equity: 1_000.0,
            balance: 1_000.0,
            available_margin: 1_000.0,
            margin_used: 0.0,
            unrealized_pnl: 0.0,
            peak_equity: 1_000.0,
            daily_start_equity: 1_000.0,
            positions: vec![],
            pending_orders: vec![],
            as_of: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_static_source_roundtrip() {
        let source = StaticAccountSource::with_accounts([flat("b"), flat("a")]);
        assert_eq!(source.active_accounts().await.unwrap(), vec!["a", "b"]);

        let state = source.get_account_state("a").await.unwrap();
        assert_eq!(state.equity, 1_000.0);

        source.remove("a").await;
        assert!(matches!(
            source.get_account_state("a").await,
            Err(AccountError::NotFound(_))
        ));
    }
}
