//! Persistence for exchange rates and service fetch state

pub mod disk;
pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::model::{CurrencyId, ExchangeRate, ModelError, NewExchangeRate, RateId};

pub use disk::DiskStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an exchange rate from {from} to {to} at {date} already exists")]
    Conflict {
        from: CurrencyId,
        to: CurrencyId,
        date: DateTime<Utc>,
    },
    #[error("exchange rate {0} not found")]
    NotFound(RateId),
    #[error(transparent)]
    Invalid(#[from] ModelError),
    #[error("storage error: {0}")]
    Backend(#[from] fjall::Error),
    #[error("corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Storage for exchange rates and the last fetch time of each service.
///
/// Implementations keep `(from, to, date)` unique and return rates in id
/// order, which is the order they were first inserted.
pub trait RateStore: Send + Sync {
    fn rates(&self) -> Result<Vec<ExchangeRate>, StoreError>;

    /// Most recent automatically fetched rate for the pair, by date.
    fn latest_automatic(
        &self,
        from: CurrencyId,
        to: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError>;

    fn insert(&self, rate: NewExchangeRate) -> Result<ExchangeRate, StoreError>;

    fn update(&self, rate: &ExchangeRate) -> Result<(), StoreError>;

    fn last_fetch(&self, service: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    fn set_last_fetch(&self, service: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Checks that `candidate` can be written next to `existing` rates.
pub(crate) fn check_unique<'a>(
    existing: impl IntoIterator<Item = &'a ExchangeRate>,
    candidate_id: Option<RateId>,
    from: CurrencyId,
    to: CurrencyId,
    date: DateTime<Utc>,
) -> Result<(), StoreError> {
    if from == to {
        return Err(ModelError::SameCurrency(from).into());
    }
    let clash = existing.into_iter().any(|r| {
        Some(r.id) != candidate_id && r.from_currency == from && r.to_currency == to && r.date == date
    });
    if clash {
        return Err(StoreError::Conflict { from, to, date });
    }
    Ok(())
}

pub(crate) fn latest_of<'a>(
    rates: impl IntoIterator<Item = &'a ExchangeRate>,
    from: CurrencyId,
    to: CurrencyId,
) -> Option<ExchangeRate> {
    rates
        .into_iter()
        .filter(|r| r.automatic && r.from_currency == from && r.to_currency == to)
        .max_by_key(|r| (r.date, r.id))
        .cloned()
}
