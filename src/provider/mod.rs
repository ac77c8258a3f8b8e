//! Upstream data providers.
//!
//! The pipeline only sees the [`Provider`] capability: a cheap health probe
//! and a single-value fetch. Everything about request and response shapes
//! stays inside the concrete providers.

mod nbp;
mod yahoo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ProviderKind;
use crate::constants::{HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::ProviderError;

pub use nbp::NbpProvider;
pub use yahoo::YahooChartProvider;

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Reachability check independent of any monitored quantity. Never errors;
    /// every failure reads as `false`.
    async fn probe(&self) -> bool;

    /// Latest value for one quantity. An empty upstream result is an error.
    async fn fetch(&self, quantity_id: &str) -> Result<f64, ProviderError>;
}

pub fn http_client() -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?)
}

pub fn build(kind: &ProviderKind, client: Client) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Yahoo { base_url } => {
            Arc::new(YahooChartProvider::new(client, base_url.clone()))
        }
        ProviderKind::Nbp { base_url } => Arc::new(NbpProvider::new(client, base_url.clone())),
    }
}

async fn get_json<T>(client: &Client, url: &str) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| ProviderError::Malformed(err.to_string()))
}
