use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{RateStore, StoreError};
use crate::core::model::{CurrencyId, ExchangeRate, ModelError, NewExchangeRate, RateId};

/// Store backed by a `fjall` keyspace on disk.
///
/// Rates live in the `rates` partition keyed by their big-endian id, so
/// iteration yields them in insertion order. The `pair_dates` partition maps
/// `from | to | date` to the rate id and backs the uniqueness check and the
/// latest rate lookup. Last fetch times live in the `services` partition
/// keyed by service name.
pub struct DiskStore {
    keyspace: Keyspace,
    rates: PartitionHandle,
    pair_dates: PartitionHandle,
    services: PartitionHandle,
    // Serializes read-check-write sequences against the rates partition
    write_lock: Mutex<()>,
}

fn pair_prefix(from: CurrencyId, to: CurrencyId) -> Vec<u8> {
    let mut key = Vec::with_capacity(20);
    key.extend_from_slice(&from.0.to_be_bytes());
    key.extend_from_slice(&to.0.to_be_bytes());
    key
}

/// `from | to | seconds | nanos`, big-endian with the sign bit of the
/// seconds flipped so keys sort by date.
fn pair_date_key(from: CurrencyId, to: CurrencyId, date: DateTime<Utc>) -> Vec<u8> {
    let mut key = pair_prefix(from, to);
    let seconds = (date.timestamp() as u64) ^ (1 << 63);
    key.extend_from_slice(&seconds.to_be_bytes());
    key.extend_from_slice(&date.timestamp_subsec_nanos().to_be_bytes());
    key
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let keyspace = Config::new(path).open()?;
        let rates = keyspace.open_partition("rates", PartitionCreateOptions::default())?;
        let pair_dates =
            keyspace.open_partition("pair_dates", PartitionCreateOptions::default())?;
        let services = keyspace.open_partition("services", PartitionCreateOptions::default())?;
        debug!("Opened rate store at {}", path.display());

        Ok(Self {
            keyspace,
            rates,
            pair_dates,
            services,
            write_lock: Mutex::new(()),
        })
    }

    fn next_id(&self) -> Result<RateId, StoreError> {
        let last = self.rates.last_key_value()?;
        Ok(match last {
            Some((key, _)) => decode_id(&key) + 1,
            None => 1,
        })
    }

    fn rate(&self, id: RateId) -> Result<Option<ExchangeRate>, StoreError> {
        match self.rates.get(id.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Id of the rate already stored for `(from, to, date)`, if any.
    fn rate_at(
        &self,
        from: CurrencyId,
        to: CurrencyId,
        date: DateTime<Utc>,
    ) -> Result<Option<RateId>, StoreError> {
        Ok(self
            .pair_dates
            .get(pair_date_key(from, to, date))?
            .map(|value| decode_id(&value)))
    }

    fn put_rate(&self, rate: &ExchangeRate, previous: Option<&ExchangeRate>) -> Result<(), StoreError> {
        let mut batch = self.keyspace.batch();
        if let Some(previous) = previous {
            batch.remove(
                &self.pair_dates,
                pair_date_key(previous.from_currency, previous.to_currency, previous.date),
            );
        }
        batch.insert(
            &self.pair_dates,
            pair_date_key(rate.from_currency, rate.to_currency, rate.date),
            rate.id.to_be_bytes().to_vec(),
        );
        batch.insert(&self.rates, rate.id.to_be_bytes().to_vec(), serde_json::to_vec(rate)?);
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

fn decode_id(key: &[u8]) -> RateId {
    let mut bytes = [0u8; 8];
    let len = key.len().min(8);
    bytes[8 - len..].copy_from_slice(&key[key.len() - len..]);
    RateId::from_be_bytes(bytes)
}

impl RateStore for DiskStore {
    fn rates(&self) -> Result<Vec<ExchangeRate>, StoreError> {
        self.rates
            .iter()
            .map(|kv| {
                let (_, value) = kv?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn latest_automatic(
        &self,
        from: CurrencyId,
        to: CurrencyId,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        // Newest first, manual rates are passed over
        for kv in self.pair_dates.prefix(pair_prefix(from, to)).rev() {
            let (_, value) = kv?;
            if let Some(rate) = self.rate(decode_id(&value))? {
                if rate.automatic {
                    return Ok(Some(rate));
                }
            }
        }
        Ok(None)
    }

    fn insert(&self, rate: NewExchangeRate) -> Result<ExchangeRate, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let (from, to, date) = (rate.from_currency, rate.to_currency, rate.date);
        if from == to {
            return Err(ModelError::SameCurrency(from).into());
        }
        if self.rate_at(from, to, date)?.is_some() {
            return Err(StoreError::Conflict { from, to, date });
        }

        let stored = rate.with_id(self.next_id()?);
        self.put_rate(&stored, None)?;
        debug!(id = stored.id, "Inserted exchange rate");
        Ok(stored)
    }

    fn update(&self, rate: &ExchangeRate) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let previous = self.rate(rate.id)?.ok_or(StoreError::NotFound(rate.id))?;
        let (from, to, date) = (rate.from_currency, rate.to_currency, rate.date);
        if from == to {
            return Err(ModelError::SameCurrency(from).into());
        }
        if self.rate_at(from, to, date)?.is_some_and(|id| id != rate.id) {
            return Err(StoreError::Conflict { from, to, date });
        }

        self.put_rate(rate, Some(&previous))?;
        debug!(id = rate.id, "Updated exchange rate");
        Ok(())
    }

    fn last_fetch(&self, service: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.services.get(service)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn set_last_fetch(&self, service: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.services
            .insert(service.as_bytes(), serde_json::to_vec(&at)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}
