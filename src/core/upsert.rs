//! Writes fetched quotes to the store, one record per pair per batch

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::core::model::{CurrencyId, NewExchangeRate, RateId};
use crate::core::provider::RateQuote;
use crate::store::{RateStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(RateId),
    Updated(RateId),
    /// The pair was already written earlier in this batch.
    Duplicate,
    /// The quote maps a currency onto itself.
    Skipped,
}

/// Resolves the stored `(from, to)` pair of a quote.
pub fn resolve_pair(quote: &RateQuote, inverted: bool) -> (CurrencyId, CurrencyId) {
    if inverted {
        (quote.target.id, quote.quote.id)
    } else {
        (quote.quote.id, quote.target.id)
    }
}

/// Applies the upsert rules for one fetch batch of one service.
///
/// Singleton services keep a single automatic record per pair and overwrite
/// it; other services append a new record on every fetch.
pub struct RateWriter<'a> {
    store: &'a dyn RateStore,
    inverted: bool,
    singleton: bool,
    processed: HashSet<(CurrencyId, CurrencyId)>,
}

impl<'a> RateWriter<'a> {
    pub fn new(store: &'a dyn RateStore, inverted: bool, singleton: bool) -> Self {
        Self {
            store,
            inverted,
            singleton,
            processed: HashSet::new(),
        }
    }

    pub fn apply(
        &mut self,
        quote: &RateQuote,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let (from, to) = resolve_pair(quote, self.inverted);
        if from == to {
            warn!(currency = %from, "Ignoring rate of a currency against itself");
            return Ok(UpsertOutcome::Skipped);
        }
        if !self.processed.insert((from, to)) {
            debug!(%from, %to, "Pair already processed in this batch");
            return Ok(UpsertOutcome::Duplicate);
        }

        if self.singleton {
            if let Some(mut existing) = self.store.latest_automatic(from, to)? {
                existing.rate = quote.rate;
                existing.date = now;
                self.store.update(&existing)?;
                return Ok(UpsertOutcome::Updated(existing.id));
            }
        }

        let created = self
            .store
            .insert(NewExchangeRate::new(from, to, quote.rate, now, true)?)?;
        Ok(UpsertOutcome::Created(created.id))
    }
}
