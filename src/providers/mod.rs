pub mod coingecko;
pub mod frankfurter;
pub mod transitive;
pub mod twelvedata;
pub mod util;

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::catalog::Catalog;
use crate::core::config::ProvidersConfig;
use crate::core::model::{ExchangeRateService, ServiceType};
use crate::core::provider::ExchangeRateProvider;
use crate::store::RateStore;

/// Shared inputs available to every provider factory.
#[derive(Clone)]
pub struct ProviderContext {
    pub endpoints: ProvidersConfig,
    pub store: Arc<dyn RateStore>,
    pub catalog: Arc<Catalog>,
}

pub type ProviderFactory = Box<
    dyn Fn(&ProviderContext, Option<&str>) -> Result<Box<dyn ExchangeRateProvider>> + Send + Sync,
>;

/// Maps service types to the providers that serve them.
pub struct ProviderRegistry {
    context: ProviderContext,
    factories: HashMap<ServiceType, ProviderFactory>,
}

impl ProviderRegistry {
    /// Creates a registry without any providers.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in providers.
    pub fn with_defaults(context: ProviderContext) -> Self {
        let mut registry = Self::new(context);
        registry.register(ServiceType::Frankfurter, |ctx, _| {
            Ok(Box::new(frankfurter::FrankfurterProvider::new(
                &ctx.endpoints.frankfurter.base_url,
            )?))
        });
        registry.register(ServiceType::CoingeckoFree, |ctx, api_key| {
            Ok(Box::new(coingecko::CoinGeckoProvider::free(
                &ctx.endpoints.coingecko_free.base_url,
                api_key.unwrap_or_default(),
            )?))
        });
        registry.register(ServiceType::CoingeckoPro, |ctx, api_key| {
            Ok(Box::new(coingecko::CoinGeckoProvider::pro(
                &ctx.endpoints.coingecko_pro.base_url,
                api_key.unwrap_or_default(),
            )?))
        });
        registry.register(ServiceType::TwelveData, |ctx, api_key| {
            Ok(Box::new(twelvedata::TwelveDataProvider::new(
                &ctx.endpoints.twelvedata.base_url,
                api_key.unwrap_or_default(),
            )?))
        });
        registry.register(ServiceType::Transitive, |ctx, _| {
            Ok(Box::new(transitive::TransitiveRateProvider::new(
                Arc::clone(&ctx.store),
                Arc::clone(&ctx.catalog),
            )))
        });
        registry
    }

    /// Adds or replaces the provider for `service_type`.
    pub fn register<F>(&mut self, service_type: ServiceType, factory: F)
    where
        F: Fn(&ProviderContext, Option<&str>) -> Result<Box<dyn ExchangeRateProvider>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(service_type, Box::new(factory));
    }

    pub fn create(&self, service: &ExchangeRateService) -> Result<Box<dyn ExchangeRateProvider>> {
        let factory = self
            .factories
            .get(&service.service_type)
            .ok_or_else(|| anyhow!("No provider registered for {}", service.service_type))?;
        factory(&self.context, service.api_key.as_deref())
    }
}
