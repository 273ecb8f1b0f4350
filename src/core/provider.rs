//! Rate provider abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::model::Currency;

/// A currency to fetch a rate for, together with the currency it is quoted in.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyPair {
    pub target: Currency,
    pub quote: Currency,
}

/// A raw rate as reported by a provider, before any inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub quote: Currency,
    pub target: Currency,
    pub rate: Decimal,
}

impl RateQuote {
    pub fn new(pair: &CurrencyPair, rate: Decimal) -> Self {
        Self {
            quote: pair.quote.clone(),
            target: pair.target.clone(),
            rate,
        }
    }
}

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    fn requires_api_key(&self) -> bool;

    /// Whether quotes come back as `target -> quote` rather than `quote -> target`.
    fn rates_inverted(&self) -> bool;

    /// Fetches rates for `pairs`. Pairs that cannot be resolved are logged and
    /// left out of the result; only failures of the whole call are errors.
    async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>>;
}
