use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::{RateStore, StoreError, check_unique, latest_of};
use crate::core::model::{CurrencyId, ExchangeRate, NewExchangeRate};

#[derive(Default)]
struct Inner {
    rates: Vec<ExchangeRate>,
    next_id: u64,
    last_fetch: HashMap<String, DateTime<Utc>>,
}

/// In-memory store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `rates`, assigning ids in order.
    pub fn with_rates(rates: impl IntoIterator<Item = NewExchangeRate>) -> Result<Self, StoreError> {
        let store = Self::new();
        for rate in rates {
            store.insert(rate)?;
        }
        Ok(store)
    }
}

impl RateStore for MemoryStore {
    fn rates(&self) -> Result<Vec<ExchangeRate>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.rates.clone())
    }

    fn latest_automatic(
        &self,
        from: CurrencyId,
        to: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(latest_of(&inner.rates, from, to))
    }

    fn insert(&self, rate: NewExchangeRate) -> Result<ExchangeRate, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        check_unique(&inner.rates, None, rate.from_currency, rate.to_currency, rate.date)?;

        inner.next_id += 1;
        let stored = rate.with_id(inner.next_id);
        debug!(id = stored.id, "Inserted exchange rate");
        inner.rates.push(stored.clone());
        Ok(stored)
    }

    fn update(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let index = inner
            .rates
            .iter()
            .position(|r| r.id == rate.id)
            .ok_or(StoreError::NotFound(rate.id))?;
        check_unique(
            &inner.rates,
            Some(rate.id),
            rate.from_currency,
            rate.to_currency,
            rate.date,
        )?;

        inner.rates[index] = rate.clone();
        debug!(id = rate.id, "Updated exchange rate");
        Ok(())
    }

    fn last_fetch(&self, service: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.last_fetch.get(service).copied())
    }

    fn set_last_fetch(&self, service: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        inner.last_fetch.insert(service.to_string(), at);
        Ok(())
    }
}
