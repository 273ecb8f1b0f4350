use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::core::provider::{CurrencyPair, ExchangeRateProvider, RateQuote};
use crate::providers::util::{decimal_from_json, http_client};

/// Twelve Data exchange rate API, one request per pair (`BASE/TARGET`).
pub struct TwelveDataProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    rate: Option<Value>,
    message: Option<String>,
}

impl TwelveDataProvider {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(TwelveDataProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(HeaderMap::new())?,
        })
    }

    async fn fetch_rate(&self, symbol: &str) -> Result<Decimal> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/exchange_rate", self.base_url),
            &[("symbol", symbol), ("apikey", self.api_key.as_str())],
        )?;
        debug!(symbol, "Requesting rate from Twelve Data");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request error for symbol {symbol}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for symbol {}", response.status(), symbol));
        }
        let data: ExchangeRateResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response for {symbol}"))?;

        match data.rate {
            Some(rate) => decimal_from_json(&rate),
            None => Err(anyhow!(
                "Could not fetch rate for {}: {}",
                symbol,
                data.message.as_deref().unwrap_or("Rate not found in response.")
            )),
        }
    }
}

#[async_trait]
impl ExchangeRateProvider for TwelveDataProvider {
    fn requires_api_key(&self) -> bool {
        true
    }

    fn rates_inverted(&self) -> bool {
        false
    }

    #[instrument(name = "TwelveDataFetch", skip_all, fields(pairs = pairs.len()))]
    async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
        let mut results = Vec::new();

        for pair in pairs {
            if pair.quote.code == pair.target.code {
                results.push(RateQuote::new(pair, Decimal::ONE));
                continue;
            }

            let symbol = format!("{}/{}", pair.quote.code, pair.target.code);
            match self.fetch_rate(&symbol).await {
                Ok(rate) => {
                    info!(%symbol, %rate, "Fetched rate from Twelve Data");
                    results.push(RateQuote::new(pair, rate));
                }
                Err(e) => error!(%symbol, error = %e, "Error fetching rate from Twelve Data"),
            }
        }

        Ok(results)
    }
}
