use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::core::catalog::Catalog;
use crate::core::graph::{RateGraph, find_path};
use crate::core::provider::{CurrencyPair, ExchangeRateProvider, RateQuote};
use crate::store::RateStore;

/// Derives rates by chaining rates that are already stored.
///
/// The path is searched from the target to its quote currency, so the rate
/// reads "one target is worth x quote" and is stored as `target -> quote`.
pub struct TransitiveRateProvider {
    store: Arc<dyn RateStore>,
    catalog: Arc<Catalog>,
}

impl TransitiveRateProvider {
    pub fn new(store: Arc<dyn RateStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl ExchangeRateProvider for TransitiveRateProvider {
    fn requires_api_key(&self) -> bool {
        false
    }

    fn rates_inverted(&self) -> bool {
        true
    }

    #[instrument(name = "TransitiveFetch", skip_all, fields(pairs = pairs.len()))]
    async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
        let rates = self.store.rates()?;
        let graph = RateGraph::from_rates(&rates);
        debug!(currencies = graph.len(), rates = rates.len(), "Built currency graph");

        let mut results = Vec::new();
        for pair in pairs {
            if pair.target.id == pair.quote.id {
                continue;
            }
            match find_path(&graph, pair.target.id, pair.quote.id) {
                Some(found) => {
                    let path = found
                        .path
                        .iter()
                        .map(|id| self.catalog.code(*id))
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    info!(%path, rate = %found.rate, "Found conversion path");
                    results.push(RateQuote::new(pair, found.rate));
                }
                None => debug!(
                    from = %pair.target.code,
                    to = %pair.quote.code,
                    "No conversion path found"
                ),
            }
        }
        Ok(results)
    }
}
