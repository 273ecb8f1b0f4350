use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use super::ui;
use crate::core::model::{Currency, NewExchangeRate};
use crate::core::{Catalog, ConversionPath, RateGraph, find_path};
use crate::store::RateStore;

fn lookup<'a>(catalog: &'a Catalog, key: &str) -> Result<&'a Currency> {
    catalog
        .find(key)
        .ok_or_else(|| anyhow!("Unknown currency: {key}"))
}

/// Resolves the rate between two currencies through the stored rates.
pub fn convert(
    store: &dyn RateStore,
    catalog: &Catalog,
    from: &str,
    to: &str,
) -> Result<Option<ConversionPath>> {
    let from = lookup(catalog, from)?;
    let to = lookup(catalog, to)?;
    let rates = store.rates().context("Failed to load exchange rates")?;
    let graph = RateGraph::from_rates(&rates);
    Ok(find_path(&graph, from.id, to.id))
}

pub fn run(store: &dyn RateStore, catalog: &Catalog, from: &str, to: &str) -> Result<()> {
    match convert(store, catalog, from, to)? {
        Some(found) => {
            let path = found
                .path
                .iter()
                .map(|id| catalog.code(*id))
                .collect::<Vec<_>>()
                .join(" -> ");
            println!("1 {} = {} {}", from.to_uppercase(), found.rate.normalize(), to.to_uppercase());
            println!("{}", ui::style_text(&format!("via {path}"), ui::StyleType::Subtle));
        }
        None => println!(
            "{}",
            ui::style_text(
                &format!("No conversion path from {from} to {to}"),
                ui::StyleType::Error
            )
        ),
    }
    Ok(())
}

/// Stores a manually entered rate, `1 from = rate to`.
pub fn add(
    store: &dyn RateStore,
    catalog: &Catalog,
    from: &str,
    to: &str,
    rate: Decimal,
) -> Result<()> {
    if rate <= Decimal::ZERO {
        anyhow::bail!("Rate must be positive, got {rate}");
    }
    let from = lookup(catalog, from)?;
    let to = lookup(catalog, to)?;
    let created = store.insert(NewExchangeRate::new(from.id, to.id, rate, Utc::now(), false)?)?;
    info!(id = created.id, from = %from.code, to = %to.code, %rate, "Added manual exchange rate");
    println!("Added rate #{}: 1 {} = {} {}", created.id, from.code, rate, to.code);
    Ok(())
}
