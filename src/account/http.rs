//! HTTP account source
//!
//! Reads account snapshots from the account service over JSON/HTTP.

use super::{AccountError, AccountSource, AccountState};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Configuration for the HTTP account source
#[derive(Debug, Clone)]
pub struct HttpAccountConfig {
    /// Base URL of the account service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Account source backed by the account service REST API
pub struct HttpAccountSource {
    config: HttpAccountConfig,
    client: Client,
}

impl HttpAccountSource {
    pub fn new(config: HttpAccountConfig) -> Result<Self, AccountError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AccountSource for HttpAccountSource {
    async fn get_account_state(&self, account_id: &str) -> Result<AccountState, AccountError> {
        let url = self.url(&format!("accounts/{account_id}"));
        tracing::trace!(url = %url, "Fetching account state");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AccountError::NotFound(account_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(AccountError::Unavailable(format!(
                "account service returned {}",
                response.status()
            )));
        }

        let state: AccountState = response
            .json()
            .await
            .map_err(|e| AccountError::Decode(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    async fn active_accounts(&self) -> Result<Vec<String>, AccountError> {
        let url = self.url("accounts/active");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccountError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AccountError::Unavailable(format!(
                "account service returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AccountError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let source = HttpAccountSource::new(HttpAccountConfig {
            base_url: "http://accounts.local:8080/".to_string(),
            timeout: Duration::from_millis(250),
        })
        .unwrap();
        assert_eq!(
            source.url("accounts/acc-1"),
            "http://accounts.local:8080/accounts/acc-1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let source = HttpAccountSource::new(HttpAccountConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(100),
        })
        .unwrap();
        let result = source.get_account_state("acc-1").await;
        assert!(matches!(result, Err(AccountError::Unavailable(_))));
    }
}
