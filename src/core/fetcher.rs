//! Runs every due service: schedule check, provider call, rate upsert

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::catalog::Catalog;
use crate::core::model::{CurrencyId, ExchangeRateService};
use crate::core::provider::CurrencyPair;
use crate::core::schedule::is_due;
use crate::core::upsert::{RateWriter, UpsertOutcome};
use crate::providers::ProviderRegistry;
use crate::store::RateStore;

/// What happened to one active service during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Fetched {
        created: usize,
        updated: usize,
        duplicates: usize,
    },
    NotDue,
    NoPairs,
    MissingApiKey,
    Failed(String),
}

impl Display for ServiceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceOutcome::Fetched {
                created,
                updated,
                duplicates,
            } => write!(
                f,
                "fetched ({created} created, {updated} updated, {duplicates} duplicates)"
            ),
            ServiceOutcome::NotDue => write!(f, "not due"),
            ServiceOutcome::NoPairs => write!(f, "no currency pairs"),
            ServiceOutcome::MissingApiKey => write!(f, "missing API key"),
            ServiceOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchReport {
    pub services: Vec<(String, ServiceOutcome)>,
}

impl FetchReport {
    pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
        self.services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> usize {
        self.services
            .iter()
            .filter(|(_, o)| matches!(o, ServiceOutcome::Failed(_)))
            .count()
    }
}

pub struct ExchangeRateFetcher {
    store: Arc<dyn RateStore>,
    registry: ProviderRegistry,
    catalog: Arc<Catalog>,
    services: Vec<ExchangeRateService>,
    last_written: Option<DateTime<Utc>>,
}

impl ExchangeRateFetcher {
    pub fn new(
        store: Arc<dyn RateStore>,
        registry: ProviderRegistry,
        catalog: Arc<Catalog>,
        services: Vec<ExchangeRateService>,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            services,
            last_written: None,
        }
    }

    /// Date stamped on the records of one service cycle. Strictly increasing
    /// so that services sharing a pair never write the same `(from, to, date)`.
    fn record_time(&mut self) -> DateTime<Utc> {
        let mut at = Utc::now();
        if let Some(previous) = self.last_written {
            if at <= previous {
                at = previous + TimeDelta::nanoseconds(1);
            }
        }
        self.last_written = Some(at);
        at
    }

    pub fn services(&self) -> &[ExchangeRateService] {
        &self.services
    }

    /// Fetches every due service, or every active one when `force` is set.
    pub async fn fetch_due_rates(&mut self, force: bool) -> FetchReport {
        let hour = Local::now().hour();
        self.fetch_due_rates_at(force, Utc::now(), hour).await
    }

    /// Same as [`Self::fetch_due_rates`] with an explicit clock.
    ///
    /// `now` drives the schedule and is recorded as `last_fetch`;
    /// `current_hour` is the local hour used by `on`/`not_on` schedules.
    /// Rate records are dated with the wall clock at write time.
    #[instrument(name = "FetchRun", skip(self), fields(services = self.services.len()))]
    pub async fn fetch_due_rates_at(
        &mut self,
        force: bool,
        now: DateTime<Utc>,
        current_hour: u32,
    ) -> FetchReport {
        let mut report = FetchReport::default();

        for index in 0..self.services.len() {
            if !self.services[index].is_active {
                debug!(service = %self.services[index].name, "Skipping inactive service");
                continue;
            }
            let name = self.services[index].name.clone();
            let outcome = match self.run_service(index, force, now, current_hour).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!(service = %name, error = %reason, "Error fetching rates");
                    ServiceOutcome::Failed(reason)
                }
            };
            report.services.push((name, outcome));
        }

        info!(
            services = report.services.len(),
            failures = report.failures(),
            "Finished fetching exchange rates"
        );
        report
    }

    async fn run_service(
        &mut self,
        index: usize,
        force: bool,
        now: DateTime<Utc>,
        current_hour: u32,
    ) -> Result<ServiceOutcome> {
        let name = self.services[index].name.clone();
        let stored_fetch = self
            .store
            .last_fetch(&name)
            .with_context(|| format!("Failed to load last fetch time of {name}"))?;
        self.services[index].last_fetch = stored_fetch;

        let service = &self.services[index];
        if !force && !is_due(service, current_hour, now) {
            debug!(service = %name, "Service not due");
            return Ok(ServiceOutcome::NotDue);
        }
        info!(service = %name, provider = %service.service_type, force, "Fetching rates");

        let pairs = self.effective_pairs(service);
        if pairs.is_empty() {
            info!(service = %name, "No currency pairs to process");
            return Ok(ServiceOutcome::NoPairs);
        }

        let provider = self.registry.create(service)?;
        if provider.requires_api_key() && !service.has_api_key() {
            error!(service = %name, "API key required but not provided");
            return Ok(ServiceOutcome::MissingApiKey);
        }

        let quotes = provider.get_rates(&pairs).await?;
        debug!(service = %name, quotes = quotes.len(), "Provider returned quotes");

        let singleton = service.singleton;
        let written_at = self.record_time();
        let mut writer = RateWriter::new(self.store.as_ref(), provider.rates_inverted(), singleton);
        let (mut created, mut updated, mut duplicates) = (0, 0, 0);
        for quote in &quotes {
            match writer.apply(quote, written_at)? {
                UpsertOutcome::Created(_) => created += 1,
                UpsertOutcome::Updated(_) => updated += 1,
                UpsertOutcome::Duplicate => duplicates += 1,
                UpsertOutcome::Skipped => {}
            }
        }

        self.store.set_last_fetch(&name, now)?;
        self.services[index].last_fetch = Some(now);
        info!(service = %name, created, updated, duplicates, "Stored exchange rates");

        Ok(ServiceOutcome::Fetched {
            created,
            updated,
            duplicates,
        })
    }

    /// Currency pairs a service fetches, in declaration order and without
    /// repeats. Direct targets are paired with their own exchange currency,
    /// accounts with theirs; entries without one are not eligible.
    pub fn effective_pairs(&self, service: &ExchangeRateService) -> Vec<CurrencyPair> {
        let mut ids: Vec<(CurrencyId, CurrencyId)> = Vec::new();
        let mut push = |pair: (CurrencyId, CurrencyId)| {
            if !ids.contains(&pair) {
                ids.push(pair);
            }
        };

        for id in &service.target_currencies {
            match self.catalog.currency(*id) {
                Some(currency) => {
                    if let Some(exchange) = currency.exchange_currency {
                        push((currency.id, exchange));
                    }
                }
                None => warn!(service = %service.name, currency = %id, "Unknown target currency"),
            }
        }
        for id in &service.target_accounts {
            match self.catalog.account(*id) {
                Some(account) => {
                    if let (Some(currency), Some(exchange)) =
                        (account.currency, account.exchange_currency)
                    {
                        push((currency, exchange));
                    }
                }
                None => warn!(service = %service.name, account = ?id, "Unknown target account"),
            }
        }

        ids.into_iter()
            .filter_map(|(target, quote)| {
                match (self.catalog.currency(target), self.catalog.currency(quote)) {
                    (Some(target), Some(quote)) => Some(CurrencyPair {
                        target: target.clone(),
                        quote: quote.clone(),
                    }),
                    _ => {
                        warn!(
                            service = %service.name,
                            %target,
                            %quote,
                            "Pair references an unknown currency"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProvidersConfig;
    use crate::core::model::{Account, AccountId, Currency, IntervalType, ServiceType};
    use crate::core::provider::{ExchangeRateProvider, RateQuote};
    use crate::providers::ProviderContext;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedProvider {
        rate: Decimal,
        inverted: bool,
        needs_key: bool,
    }

    #[async_trait]
    impl ExchangeRateProvider for FixedProvider {
        fn requires_api_key(&self) -> bool {
            self.needs_key
        }

        fn rates_inverted(&self) -> bool {
            self.inverted
        }

        async fn get_rates(&self, pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
            Ok(pairs.iter().map(|p| RateQuote::new(p, self.rate)).collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ExchangeRateProvider for FailingProvider {
        fn requires_api_key(&self) -> bool {
            false
        }

        fn rates_inverted(&self) -> bool {
            false
        }

        async fn get_rates(&self, _pairs: &[CurrencyPair]) -> Result<Vec<RateQuote>> {
            Err(anyhow!("upstream exploded"))
        }
    }

    fn currency(id: u32, code: &str, exchange: Option<u32>) -> Currency {
        Currency {
            id: CurrencyId(id),
            code: code.to_string(),
            name: code.to_string(),
            decimal_places: 2,
            exchange_currency: exchange.map(CurrencyId),
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(
                vec![
                    currency(1, "USD", None),
                    currency(2, "EUR", Some(1)),
                    currency(3, "BTC", Some(1)),
                    currency(4, "GBP", None),
                ],
                vec![
                    Account {
                        id: AccountId(1),
                        name: "Wallet".to_string(),
                        currency: Some(CurrencyId(3)),
                        exchange_currency: Some(CurrencyId(2)),
                    },
                    Account {
                        id: AccountId(2),
                        name: "Checking".to_string(),
                        currency: Some(CurrencyId(4)),
                        exchange_currency: None,
                    },
                ],
            )
            .unwrap(),
        )
    }

    fn service(name: &str, service_type: ServiceType) -> ExchangeRateService {
        ExchangeRateService {
            name: name.to_string(),
            service_type,
            is_active: true,
            api_key: None,
            interval_type: IntervalType::Every,
            fetch_interval: "1".to_string(),
            last_fetch: None,
            target_currencies: vec![CurrencyId(2)],
            target_accounts: vec![],
            singleton: false,
        }
    }

    fn fetcher(
        store: Arc<MemoryStore>,
        services: Vec<ExchangeRateService>,
        configure: impl FnOnce(&mut ProviderRegistry),
    ) -> ExchangeRateFetcher {
        let catalog = catalog();
        let mut registry = ProviderRegistry::new(ProviderContext {
            endpoints: ProvidersConfig::default(),
            store: store.clone(),
            catalog: Arc::clone(&catalog),
        });
        configure(&mut registry);
        ExchangeRateFetcher::new(store, registry, catalog, services)
    }

    fn fixed(registry: &mut ProviderRegistry, service_type: ServiceType, rate: Decimal) {
        registry.register(service_type, move |_, _| {
            Ok(Box::new(FixedProvider {
                rate,
                inverted: false,
                needs_key: false,
            }))
        });
    }

    #[tokio::test]
    async fn test_failing_service_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut fetcher = fetcher(
            store.clone(),
            vec![
                service("broken", ServiceType::TwelveData),
                service("healthy", ServiceType::Frankfurter),
            ],
            |registry| {
                registry.register(ServiceType::TwelveData, |_, _| Ok(Box::new(FailingProvider)));
                fixed(registry, ServiceType::Frankfurter, dec!(1.1));
            },
        );

        let report = fetcher.fetch_due_rates_at(false, now, 12).await;

        assert!(matches!(
            report.outcome("broken"),
            Some(ServiceOutcome::Failed(reason)) if reason.contains("upstream exploded")
        ));
        assert_eq!(
            report.outcome("healthy"),
            Some(&ServiceOutcome::Fetched {
                created: 1,
                updated: 0,
                duplicates: 0
            })
        );
        assert_eq!(report.failures(), 1);

        let rates = store.rates().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].from_currency, CurrencyId(1));
        assert_eq!(rates[0].to_currency, CurrencyId(2));
        assert_eq!(rates[0].rate, dec!(1.1));
        assert_eq!(store.last_fetch("healthy").unwrap(), Some(now));
        assert_eq!(store.last_fetch("broken").unwrap(), None);
    }

    #[tokio::test]
    async fn test_schedule_and_force() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut every_six = service("ecb", ServiceType::Frankfurter);
        every_six.fetch_interval = "6".to_string();
        let mut fetcher = fetcher(store.clone(), vec![every_six], |registry| {
            fixed(registry, ServiceType::Frankfurter, dec!(1.1));
        });

        let first = fetcher.fetch_due_rates_at(false, now, 0).await;
        assert!(matches!(first.outcome("ecb"), Some(ServiceOutcome::Fetched { .. })));

        let later = now + TimeDelta::hours(2);
        let second = fetcher.fetch_due_rates_at(false, later, 2).await;
        assert_eq!(second.outcome("ecb"), Some(&ServiceOutcome::NotDue));
        assert_eq!(store.last_fetch("ecb").unwrap(), Some(now));

        let forced = fetcher.fetch_due_rates_at(true, later, 2).await;
        assert!(matches!(forced.outcome("ecb"), Some(ServiceOutcome::Fetched { .. })));
        assert_eq!(store.last_fetch("ecb").unwrap(), Some(later));
        assert_eq!(store.rates().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_last_fetch_is_read_from_store() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.set_last_fetch("ecb", now - TimeDelta::hours(1)).unwrap();
        let mut every_six = service("ecb", ServiceType::Frankfurter);
        every_six.fetch_interval = "6".to_string();
        let mut fetcher = fetcher(store, vec![every_six], |registry| {
            fixed(registry, ServiceType::Frankfurter, dec!(1.1));
        });

        let report = fetcher.fetch_due_rates_at(false, now, 0).await;
        assert_eq!(report.outcome("ecb"), Some(&ServiceOutcome::NotDue));
    }

    #[tokio::test]
    async fn test_skips_inactive_and_misconfigured_services() {
        let store = Arc::new(MemoryStore::new());
        let mut inactive = service("off", ServiceType::Frankfurter);
        inactive.is_active = false;
        let mut empty = service("empty", ServiceType::Frankfurter);
        empty.target_currencies = vec![CurrencyId(1), CurrencyId(4)];
        empty.target_accounts = vec![AccountId(2)];
        let keyless = service("keyless", ServiceType::CoingeckoFree);
        let mut broken_schedule = service("hours", ServiceType::Frankfurter);
        broken_schedule.interval_type = IntervalType::On;
        broken_schedule.fetch_interval = "25".to_string();

        let mut fetcher = fetcher(
            store.clone(),
            vec![inactive, empty, keyless, broken_schedule],
            |registry| {
                fixed(registry, ServiceType::Frankfurter, dec!(1.1));
                registry.register(ServiceType::CoingeckoFree, |_, _| {
                    Ok(Box::new(FixedProvider {
                        rate: dec!(1),
                        inverted: true,
                        needs_key: true,
                    }))
                });
            },
        );

        let report = fetcher.fetch_due_rates_at(true, Utc::now(), 3).await;
        assert_eq!(report.outcome("off"), None);
        assert_eq!(report.outcome("empty"), Some(&ServiceOutcome::NoPairs));
        assert_eq!(report.outcome("keyless"), Some(&ServiceOutcome::MissingApiKey));
        assert!(matches!(report.outcome("hours"), Some(ServiceOutcome::Fetched { .. })));
        assert_eq!(store.last_fetch("empty").unwrap(), None);
        assert_eq!(store.last_fetch("keyless").unwrap(), None);

        let unforced = fetcher.fetch_due_rates_at(false, Utc::now(), 3).await;
        assert_eq!(unforced.outcome("hours"), Some(&ServiceOutcome::NotDue));
    }

    #[tokio::test]
    async fn test_singleton_inverted_service_updates_in_place() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut coins = service("coins", ServiceType::CoingeckoPro);
        coins.api_key = Some("key".to_string());
        coins.singleton = true;
        coins.target_currencies = vec![CurrencyId(3)];
        coins.target_accounts = vec![AccountId(1)];

        let mut fetcher = fetcher(store.clone(), vec![coins], |registry| {
            registry.register(ServiceType::CoingeckoPro, |_, _| {
                Ok(Box::new(FixedProvider {
                    rate: dec!(60000),
                    inverted: true,
                    needs_key: true,
                }))
            });
        });

        fetcher.fetch_due_rates_at(true, now, 0).await;
        let first_date = store.rates().unwrap()[0].date;
        let report = fetcher
            .fetch_due_rates_at(true, now + TimeDelta::hours(1), 1)
            .await;
        assert_eq!(
            report.outcome("coins"),
            Some(&ServiceOutcome::Fetched {
                created: 0,
                updated: 2,
                duplicates: 0
            })
        );

        let rates = store.rates().unwrap();
        assert_eq!(rates.len(), 2);
        assert!(rates.iter().all(|r| r.from_currency == CurrencyId(3)));
        assert!(rates.iter().all(|r| r.date > first_date));
        assert_eq!(rates[0].date, rates[1].date);
        assert_eq!(
            store.last_fetch("coins").unwrap(),
            Some(now + TimeDelta::hours(1))
        );
    }

    #[tokio::test]
    async fn test_services_sharing_a_pair_in_one_run() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut latest = service("ecb-latest", ServiceType::Frankfurter);
        latest.singleton = true;
        let mut fetcher = fetcher(
            store.clone(),
            vec![
                service("ecb-a", ServiceType::Frankfurter),
                service("ecb-b", ServiceType::Frankfurter),
                latest,
            ],
            |registry| fixed(registry, ServiceType::Frankfurter, dec!(1.1)),
        );

        let report = fetcher.fetch_due_rates_at(false, now, 0).await;

        let created_one = ServiceOutcome::Fetched {
            created: 1,
            updated: 0,
            duplicates: 0,
        };
        assert_eq!(report.outcome("ecb-a"), Some(&created_one));
        assert_eq!(report.outcome("ecb-b"), Some(&created_one));
        assert_eq!(
            report.outcome("ecb-latest"),
            Some(&ServiceOutcome::Fetched {
                created: 0,
                updated: 1,
                duplicates: 0
            })
        );
        assert_eq!(report.failures(), 0);

        let rates = store.rates().unwrap();
        assert_eq!(rates.len(), 2);
        assert!(rates[0].date < rates[1].date);
        for name in ["ecb-a", "ecb-b", "ecb-latest"] {
            assert_eq!(store.last_fetch(name).unwrap(), Some(now));
        }
    }

    #[tokio::test]
    async fn test_unregistered_provider_fails_service() {
        let store = Arc::new(MemoryStore::new());
        let mut fetcher = fetcher(
            store,
            vec![service("nothing", ServiceType::Transitive)],
            |_| {},
        );
        let report = fetcher.fetch_due_rates_at(true, Utc::now(), 0).await;
        assert_eq!(
            report.outcome("nothing"),
            Some(&ServiceOutcome::Failed(
                "No provider registered for Transitive".to_string()
            ))
        );
    }

    #[test]
    fn test_effective_pairs_order_and_dedup() {
        let fetcher = fetcher(Arc::new(MemoryStore::new()), vec![], |_| {});
        let mut svc = service("mixed", ServiceType::Frankfurter);
        svc.target_currencies = vec![CurrencyId(3), CurrencyId(2), CurrencyId(3), CurrencyId(99)];
        svc.target_accounts = vec![AccountId(1), AccountId(2), AccountId(7)];

        let pairs = fetcher.effective_pairs(&svc);
        let codes: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.target.code.as_str(), p.quote.code.as_str()))
            .collect();
        assert_eq!(codes, vec![("BTC", "USD"), ("EUR", "USD"), ("BTC", "EUR")]);
    }
}
