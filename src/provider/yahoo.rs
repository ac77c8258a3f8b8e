use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::constants::YAHOO_PROBE_SYMBOL;
use crate::error::ProviderError;
use crate::logging;

use super::{get_json, Provider};

/// Index levels from the Yahoo Finance chart endpoint.
pub struct YahooChartProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl YahooChartProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn chart(&self, symbol: &str) -> Result<ChartResult, ProviderError> {
        let url = format!(
            "{}/v8/finance/chart/{symbol}?range=1d&interval=15m",
            self.base_url
        );
        let envelope: ChartEnvelope = get_json(&self.client, &url).await?;
        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ProviderError::Empty(symbol.to_string()))
    }
}

#[async_trait]
impl Provider for YahooChartProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn probe(&self) -> bool {
        match self.chart(YAHOO_PROBE_SYMBOL).await {
            Ok(result) => result
                .meta
                .and_then(|meta| meta.regular_market_price)
                .is_some(),
            Err(err) => {
                logging::warn(
                    "probe.error",
                    "Yahoo Finance probe request failed",
                    serde_json::json!({ "error": err.to_string() }),
                );
                false
            }
        }
    }

    async fn fetch(&self, quantity_id: &str) -> Result<f64, ProviderError> {
        let result = self.chart(quantity_id).await?;
        result
            .indicators
            .into_iter()
            .flat_map(|indicators| indicators.quote)
            .flat_map(|series| series.close)
            .flatten()
            .filter(|close| close.is_finite())
            .last()
            .ok_or_else(|| ProviderError::Empty(quantity_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_provider(
        symbol: &str,
        status: u16,
        body: serde_json::Value,
    ) -> (MockServer, YahooChartProvider) {
        crate::logging::set_silent(true);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{symbol}")))
            .and(query_param("interval", "15m"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        let provider = YahooChartProvider::new(Client::new(), server.uri());
        (server, provider)
    }

    fn chart(closes: serde_json::Value, price: Option<f64>) -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": { "regularMarketPrice": price },
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn fetch_returns_last_non_null_close() {
        let (_server, provider) =
            mock_provider("GDAXI", 200, chart(json!([17990.0, 18000.5, null]), None)).await;
        let value = provider.fetch("GDAXI").await.expect("close value");
        assert_eq!(value, 18000.5);
    }

    #[tokio::test]
    async fn fetch_treats_zero_rows_as_error() {
        let (_server, provider) = mock_provider("GSPC", 200, chart(json!([]), None)).await;
        let err = provider.fetch("GSPC").await.unwrap_err();
        assert!(matches!(err, ProviderError::Empty(symbol) if symbol == "GSPC"));
    }

    #[tokio::test]
    async fn fetch_surfaces_http_status() {
        let (_server, provider) = mock_provider("GSPC", 429, json!({})).await;
        let err = provider.fetch("GSPC").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status(429)));
    }

    #[tokio::test]
    async fn probe_requires_regular_market_price() {
        let (_up_server, up) = mock_provider("MSFT", 200, chart(json!([410.0]), Some(410.2))).await;
        assert!(up.probe().await);

        let (_missing_server, missing) =
            mock_provider("MSFT", 200, chart(json!([410.0]), None)).await;
        assert!(!missing.probe().await);

        let (_down_server, down) = mock_provider("MSFT", 503, json!({})).await;
        assert!(!down.probe().await);
    }
}
