//! Currencies, accounts, exchange rates and fetch service definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

use crate::core::hours::{IntervalError, parse_hour_ranges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(pub u32);

impl Display for CurrencyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u32);

pub type RateId = u64;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("from and to currencies cannot be the same ({0})")]
    SameCurrency(CurrencyId),
    #[error("currency {0} cannot have itself as exchange currency")]
    SelfExchange(CurrencyId),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Currency {
    pub id: CurrencyId,
    pub code: String,
    pub name: String,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    #[serde(default)]
    pub exchange_currency: Option<CurrencyId>,
}

fn default_decimal_places() -> u32 {
    2
}

impl Currency {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.exchange_currency == Some(self.id) {
            return Err(ModelError::SelfExchange(self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    #[serde(default)]
    pub currency: Option<CurrencyId>,
    #[serde(default)]
    pub exchange_currency: Option<CurrencyId>,
}

/// A stored rate: one unit of `from_currency` is worth `rate` units of `to_currency`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRate {
    pub id: RateId,
    pub from_currency: CurrencyId,
    pub to_currency: CurrencyId,
    pub rate: Decimal,
    pub date: DateTime<Utc>,
    pub automatic: bool,
}

/// A rate that has not been assigned an id by the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExchangeRate {
    pub from_currency: CurrencyId,
    pub to_currency: CurrencyId,
    pub rate: Decimal,
    pub date: DateTime<Utc>,
    pub automatic: bool,
}

impl NewExchangeRate {
    pub fn new(
        from_currency: CurrencyId,
        to_currency: CurrencyId,
        rate: Decimal,
        date: DateTime<Utc>,
        automatic: bool,
    ) -> Result<Self, ModelError> {
        if from_currency == to_currency {
            return Err(ModelError::SameCurrency(from_currency));
        }
        Ok(Self {
            from_currency,
            to_currency,
            rate,
            date,
            automatic,
        })
    }

    pub fn with_id(self, id: RateId) -> ExchangeRate {
        ExchangeRate {
            id,
            from_currency: self.from_currency,
            to_currency: self.to_currency,
            rate: self.rate,
            date: self.date,
            automatic: self.automatic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    CoingeckoFree,
    CoingeckoPro,
    Transitive,
    Frankfurter,
    #[serde(rename = "twelvedata")]
    TwelveData,
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ServiceType::CoingeckoFree => "CoinGecko (Demo/Free)",
                ServiceType::CoingeckoPro => "CoinGecko (Pro)",
                ServiceType::Transitive => "Transitive",
                ServiceType::Frankfurter => "Frankfurter",
                ServiceType::TwelveData => "TwelveData",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalType {
    On,
    #[default]
    Every,
    NotOn,
}

impl Display for IntervalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                IntervalType::On => "on",
                IntervalType::Every => "every",
                IntervalType::NotOn => "not on",
            }
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRateService {
    pub name: String,
    pub service_type: ServiceType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub interval_type: IntervalType,
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: String,
    /// Loaded from the store, never from configuration.
    #[serde(skip)]
    pub last_fetch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target_currencies: Vec<CurrencyId>,
    #[serde(default)]
    pub target_accounts: Vec<AccountId>,
    #[serde(default)]
    pub singleton: bool,
}

fn default_true() -> bool {
    true
}

fn default_fetch_interval() -> String {
    "24".to_string()
}

impl ExchangeRateService {
    /// Whether a usable API key is configured. Blank keys count as missing.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Checks `fetch_interval` against `interval_type` and returns the
    /// normalized interval string.
    ///
    /// `every` accepts whole hours between 1 and 24. `on` and `not_on`
    /// accept hour lists and ranges, normalized to a sorted list of hours.
    pub fn validate(&self) -> Result<String, IntervalError> {
        let interval = self.fetch_interval.trim();
        match self.interval_type {
            IntervalType::Every => {
                if interval.is_empty() || !interval.chars().all(|c| c.is_ascii_digit()) {
                    return Err(IntervalError::NotAnInteger(interval.to_string()));
                }
                let hours: u32 = interval
                    .parse()
                    .map_err(|_| IntervalError::NotAnInteger(interval.to_string()))?;
                if !(1..=24).contains(&hours) {
                    return Err(IntervalError::EveryOutOfRange(hours));
                }
                Ok(hours.to_string())
            }
            IntervalType::On | IntervalType::NotOn => {
                let hours = parse_hour_ranges(interval)?;
                Ok(hours
                    .iter()
                    .map(|h| h.to_string())
                    .collect::<Vec<_>>()
                    .join(","))
            }
        }
    }
}
