use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::logging;

use super::{get_json, Provider};

/// Mid exchange rates (table A) from the National Bank of Poland API.
pub struct NbpProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RateSeries {
    #[serde(default)]
    rates: Vec<Rate>,
}

#[derive(Debug, Deserialize)]
struct Rate {
    mid: f64,
}

#[derive(Debug, Deserialize)]
struct RateTable {
    #[serde(default)]
    rates: Vec<serde_json::Value>,
}

impl NbpProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider for NbpProvider {
    fn name(&self) -> &str {
        "nbp"
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/exchangerates/tables/a/?format=json", self.base_url);
        match get_json::<Vec<RateTable>>(&self.client, &url).await {
            Ok(tables) => tables.first().is_some_and(|table| !table.rates.is_empty()),
            Err(err) => {
                logging::warn(
                    "probe.error",
                    "NBP probe request failed",
                    serde_json::json!({ "error": err.to_string() }),
                );
                false
            }
        }
    }

    async fn fetch(&self, quantity_id: &str) -> Result<f64, ProviderError> {
        let url = format!(
            "{}/api/exchangerates/rates/a/{}/?format=json",
            self.base_url,
            quantity_id.to_lowercase()
        );
        let series: RateSeries = get_json(&self.client, &url).await?;
        series
            .rates
            .first()
            .map(|rate| rate.mid)
            .ok_or_else(|| ProviderError::Empty(quantity_id.to_string()))
    }
}
