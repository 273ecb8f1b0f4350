use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, instrument};

use crate::core::provider::{CurrencyPair, ExchangeRateProvider, RateQuote};
use crate::providers::util::{decimal_from_json, http_client};

/// Frankfurter (ECB reference rates). Returns `1 base = x symbol`.
pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(FrankfurterProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(HeaderMap::new())?,
        })
    }

    async fn fetch_group(&self, base: &str, pairs: &[&CurrencyPair]) -> Result<Vec<RateQuote>> {
        let symbols: Vec<&str> = pairs
            .iter()
            .map(|p| p.target.code.as_str())
            .filter(|code| *code != base)
            .collect();

        // Only base-to-base pairs requested, no call needed
        if symbols.is_empty() {
            return Ok(pairs
                .iter()
                .map(|p| RateQuote::new(p, Decimal::ONE))
                .collect());
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/latest", self.base_url),
            &[("base", base), ("symbols", symbols.join(",").as_str())],
        )?;
        debug!("Requesting rates from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request error for base {base}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for base {}", response.status(), base));
        }
        let data: FrankfurterResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response for base {base}"))?;

        let mut results = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.target.code == base {
                results.push(RateQuote::new(pair, Decimal::ONE));
                continue;
            }
            match data.rates.get(&pair.target.code).map(decimal_from_json) {
                Some(Ok(rate)) => results.push(RateQuote::new(pair, rate)),
                Some(Err(e)) => error!(
                    base,
                    symbol = %pair.target.code,
                    error = %e,
                    "Invalid rate in Frankfurter response"
                ),
                None => error!(
                    base,
                    symbol = %pair.target.code,
                    "Rate missing from Frankfurter response"
                ),
            }
        }
        Ok(results)
    }
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: HashMap<String, Value>,
}

#[async_trait]
impl ExchangeRateProvider for FrankfurterProvider {
    fn requires_api_key(&self) -> bool {
        false
    }

    fn rates_inverted(&self) -> bool {
        false
    }

    #[instrument(name = "FrankfurterFetch", skip_all, fields(pairs = pairs.len()))]
    async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
        // One call per quote currency, groups kept in first-seen order
        let mut groups: Vec<(&str, Vec<&CurrencyPair>)> = Vec::new();
        for pair in pairs {
            let base = pair.quote.code.as_str();
            match groups.iter_mut().find(|(code, _)| *code == base) {
                Some((_, members)) => members.push(pair),
                None => groups.push((base, vec![pair])),
            }
        }

        let mut results = Vec::new();
        for (base, members) in groups {
            match self.fetch_group(base, &members).await {
                Ok(quotes) => results.extend(quotes),
                Err(e) => error!(base, error = %e, "Error fetching rates from Frankfurter"),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Currency, CurrencyId};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn currency(id: u32, code: &str) -> Currency {
        Currency {
            id: CurrencyId(id),
            code: code.to_string(),
            name: code.to_string(),
            decimal_places: 2,
            exchange_currency: None,
        }
    }

    fn pair(target: &Currency, quote: &Currency) -> CurrencyPair {
        CurrencyPair {
            target: target.clone(),
            quote: quote.clone(),
        }
    }

    #[tokio::test]
    async fn test_rates_grouped_by_base() {
        let mock_server = MockServer::start().await;
        let (eur, usd, gbp, chf) = (
            currency(1, "EUR"),
            currency(2, "USD"),
            currency(3, "GBP"),
            currency(4, "CHF"),
        );

        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("base", "EUR"))
            .and(query_param("symbols", "USD,GBP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount":1.0,"base":"EUR","date":"2024-03-08","rates":{"USD":1.0942,"GBP":0.85}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("base", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"amount":1.0,"base":"USD","date":"2024-03-08","rates":{"CHF":0.88}}"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = FrankfurterProvider::new(&mock_server.uri()).unwrap();
        let quotes = provider
            .get_rates(&[pair(&usd, &eur), pair(&chf, &usd), pair(&gbp, &eur)])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0], RateQuote::new(&pair(&usd, &eur), dec!(1.0942)));
        assert_eq!(quotes[1], RateQuote::new(&pair(&gbp, &eur), dec!(0.85)));
        assert_eq!(quotes[2], RateQuote::new(&pair(&chf, &usd), dec!(0.88)));
    }

    #[tokio::test]
    async fn test_same_code_pair_needs_no_request() {
        let mock_server = MockServer::start().await;
        let provider = FrankfurterProvider::new(&mock_server.uri()).unwrap();
        let eur_a = currency(1, "EUR");
        let eur_b = currency(2, "EUR");

        let quotes = provider.get_rates(&[pair(&eur_b, &eur_a)]).await.unwrap();
        assert_eq!(quotes, vec![RateQuote::new(&pair(&eur_b, &eur_a), Decimal::ONE)]);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_group_is_skipped() {
        let mock_server = MockServer::start().await;
        let (eur, usd, jpy) = (currency(1, "EUR"), currency(2, "USD"), currency(3, "JPY"));

        Mock::given(method("GET"))
            .and(query_param("base", "EUR"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("base", "USD"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"rates":{"XYZ":1.0}}"#),
            )
            .mount(&mock_server)
            .await;

        let provider = FrankfurterProvider::new(&mock_server.uri()).unwrap();
        let quotes = provider
            .get_rates(&[pair(&usd, &eur), pair(&jpy, &usd)])
            .await
            .unwrap();
        assert!(quotes.is_empty());
    }
}
