//! Core business logic abstractions

pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod graph;
pub mod hours;
pub mod log;
pub mod model;
pub mod provider;
pub mod schedule;
pub mod upsert;

// Re-export main types for cleaner imports
pub use catalog::Catalog;
pub use graph::{ConversionPath, RateGraph, find_path};
pub use model::{Account, Currency, CurrencyId, ExchangeRate, ExchangeRateService};
pub use provider::{CurrencyPair, ExchangeRateProvider, RateQuote};
