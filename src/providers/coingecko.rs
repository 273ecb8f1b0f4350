use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, instrument};

use crate::core::provider::{CurrencyPair, ExchangeRateProvider, RateQuote};
use crate::providers::util::{decimal_from_json, http_client};

const DEMO_KEY_HEADER: &str = "x-cg-demo-api-key";
const PRO_KEY_HEADER: &str = "x-cg-pro-api-key";

/// CoinGecko simple price API.
///
/// Currency codes are used as CoinGecko ids (lowercased). Prices come back as
/// "one target is worth x quote", the inverse of the stored convention.
pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn free(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_key_header(base_url, DEMO_KEY_HEADER, api_key)
    }

    pub fn pro(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_key_header(base_url, PRO_KEY_HEADER, api_key)
    }

    fn with_key_header(base_url: &str, header: &'static str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(api_key).context("Invalid CoinGecko API key")?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(header), value);

        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(headers)?,
        })
    }

    async fn fetch_prices(&self, ids: &str) -> Result<HashMap<String, HashMap<String, Value>>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/v3/simple/price", self.base_url),
            &[("ids", ids), ("vs_currencies", ids)],
        )?;
        debug!("Requesting prices from {}", url);

        let response = self.client.get(url).send().await.context("Request error")?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }
        response
            .json()
            .await
            .context("Failed to parse CoinGecko response")
    }
}

#[async_trait]
impl ExchangeRateProvider for CoinGeckoProvider {
    fn requires_api_key(&self) -> bool {
        true
    }

    fn rates_inverted(&self) -> bool {
        true
    }

    #[instrument(name = "CoinGeckoFetch", skip_all, fields(pairs = pairs.len()))]
    async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
        let ids: BTreeSet<String> = pairs
            .iter()
            .flat_map(|p| [p.target.code.to_lowercase(), p.quote.code.to_lowercase()])
            .collect();
        let ids = ids.into_iter().collect::<Vec<_>>().join(",");

        let prices = match self.fetch_prices(&ids).await {
            Ok(prices) => prices,
            Err(e) => {
                error!(error = %e, "Error fetching rates from CoinGecko API");
                return Ok(Vec::new());
            }
        };

        let mut results = Vec::new();
        for pair in pairs {
            let target = pair.target.code.to_lowercase();
            let quote = pair.quote.code.to_lowercase();
            let Some(price) = prices.get(&target).and_then(|vs| vs.get(&quote)) else {
                error!(%target, %quote, "Rate not found in CoinGecko response");
                continue;
            };
            match decimal_from_json(price) {
                Ok(rate) => results.push(RateQuote::new(pair, rate)),
                Err(e) => error!(%target, %quote, error = %e, "Error calculating rate"),
            }
        }
        Ok(results)
    }
}
