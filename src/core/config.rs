use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::model::{Account, Currency, ExchangeRateService};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default = "default_frankfurter")]
    pub frankfurter: ProviderEndpoint,
    #[serde(default = "default_coingecko_free")]
    pub coingecko_free: ProviderEndpoint,
    #[serde(default = "default_coingecko_pro")]
    pub coingecko_pro: ProviderEndpoint,
    #[serde(default = "default_twelvedata")]
    pub twelvedata: ProviderEndpoint,
}

fn endpoint(base_url: &str) -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: base_url.to_string(),
    }
}

fn default_frankfurter() -> ProviderEndpoint {
    endpoint("https://api.frankfurter.dev")
}

fn default_coingecko_free() -> ProviderEndpoint {
    endpoint("https://api.coingecko.com")
}

fn default_coingecko_pro() -> ProviderEndpoint {
    endpoint("https://pro-api.coingecko.com")
}

fn default_twelvedata() -> ProviderEndpoint {
    endpoint("https://api.twelvedata.com")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            frankfurter: default_frankfurter(),
            coingecko_free: default_coingecko_free(),
            coingecko_pro: default_coingecko_pro(),
            twelvedata: default_twelvedata(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub currencies: Vec<Currency>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub services: Vec<ExchangeRateService>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "ratefetch", "ratefetch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "ratefetch", "ratefetch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().join("rates"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{AccountId, CurrencyId, IntervalType, ServiceType};

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
currencies:
  - id: 1
    code: "USD"
    name: "US Dollar"
  - id: 2
    code: "EUR"
    name: "Euro"
    exchange_currency: 1
  - id: 3
    code: "BTC"
    name: "Bitcoin"
    decimal_places: 8
    exchange_currency: 1
accounts:
  - id: 1
    name: "Crypto wallet"
    currency: 3
    exchange_currency: 2
services:
  - name: "ECB"
    service_type: frankfurter
    interval_type: every
    fetch_interval: "6"
    target_currencies: [2]
  - name: "Coins"
    service_type: coingecko_free
    api_key: "demo-key"
    interval_type: not_on
    fetch_interval: "0-6"
    target_accounts: [1]
    singleton: true
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.currencies.len(), 3);
        assert_eq!(config.currencies[0].decimal_places, 2);
        assert_eq!(config.currencies[0].exchange_currency, None);
        assert_eq!(config.currencies[2].decimal_places, 8);
        assert_eq!(config.currencies[2].exchange_currency, Some(CurrencyId(1)));

        assert_eq!(config.accounts[0].id, AccountId(1));
        assert_eq!(config.accounts[0].exchange_currency, Some(CurrencyId(2)));

        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].service_type, ServiceType::Frankfurter);
        assert_eq!(config.services[0].fetch_interval, "6");
        assert!(config.services[0].last_fetch.is_none());
        assert_eq!(config.services[1].service_type, ServiceType::CoingeckoFree);
        assert_eq!(config.services[1].interval_type, IntervalType::NotOn);
        assert_eq!(config.services[1].api_key.as_deref(), Some("demo-key"));
        assert!(config.services[1].singleton);

        assert_eq!(config.providers, ProvidersConfig::default());
        assert!(config.data_path.is_none());
    }

    #[test]
    fn test_unsupported_service_types_are_rejected() {
        for service_type in ["pictet", "twelvedata_markets"] {
            let yaml_str = format!(
                r#"
currencies: []
services:
  - name: "Unsupported"
    service_type: {service_type}
"#
            );
            let result = serde_yaml::from_str::<AppConfig>(&yaml_str);
            assert!(result.is_err(), "{service_type} should not parse");
        }
    }

    #[test]
    fn test_provider_overrides() {
        let yaml_str = r#"
currencies: []
providers:
  frankfurter:
    base_url: "http://example.com/frankfurter"
data_path: "/tmp/rates"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(
            config.providers.frankfurter.base_url,
            "http://example.com/frankfurter"
        );
        assert_eq!(
            config.providers.twelvedata.base_url,
            "https://api.twelvedata.com"
        );
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/rates")
        );
    }
}
