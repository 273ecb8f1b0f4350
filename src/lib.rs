pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::Catalog;
use crate::core::config::AppConfig;
use crate::core::fetcher::ExchangeRateFetcher;
use crate::providers::{ProviderContext, ProviderRegistry};
use crate::store::{DiskStore, RateStore};

pub enum AppCommand {
    Fetch { force: bool },
    Rate { from: String, to: String },
    AddRate { from: String, to: String, rate: Decimal },
    Rates,
    Services,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("ratefetch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let catalog = Arc::new(
        Catalog::new(config.currencies.clone(), config.accounts.clone())
            .context("Invalid currency configuration")?,
    );
    let data_path = config.default_data_path()?;
    let store: Arc<dyn RateStore> = Arc::new(DiskStore::open(&data_path)?);

    match command {
        AppCommand::Fetch { force } => {
            let registry = ProviderRegistry::with_defaults(ProviderContext {
                endpoints: config.providers.clone(),
                store: Arc::clone(&store),
                catalog: Arc::clone(&catalog),
            });
            let mut fetcher = ExchangeRateFetcher::new(
                Arc::clone(&store),
                registry,
                Arc::clone(&catalog),
                config.services,
            );
            cli::fetch::run(&mut fetcher, force).await
        }
        AppCommand::Rate { from, to } => cli::rate::run(store.as_ref(), &catalog, &from, &to),
        AppCommand::AddRate { from, to, rate } => {
            cli::rate::add(store.as_ref(), &catalog, &from, &to, rate)
        }
        AppCommand::Rates => cli::rates::run(store.as_ref(), &catalog),
        AppCommand::Services => cli::services::run(&config.services, store.as_ref(), &catalog),
    }
}
