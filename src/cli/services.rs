use super::ui;
use crate::core::Catalog;
use crate::core::model::{ExchangeRateService, IntervalType};
use crate::store::RateStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table};
use tracing::warn;

pub fn run(services: &[ExchangeRateService], store: &dyn RateStore, catalog: &Catalog) -> Result<()> {
    if services.is_empty() {
        println!("No exchange rate services configured.");
        return Ok(());
    }

    let mut last_fetches = Vec::with_capacity(services.len());
    for service in services {
        last_fetches.push(store.last_fetch(&service.name)?);
    }

    println!(
        "\n{}",
        ui::style_text("Exchange rate services", ui::StyleType::Title)
    );
    println!("{}", services_table(services, &last_fetches, catalog));
    Ok(())
}

fn schedule_cell(service: &ExchangeRateService) -> Cell {
    match service.validate() {
        Ok(interval) => {
            let text = match service.interval_type {
                IntervalType::Every => format!("every {interval}h"),
                other => format!("{other} {interval}"),
            };
            Cell::new(text)
        }
        Err(e) => {
            warn!(service = %service.name, error = %e, "Invalid fetch interval");
            Cell::new(format!("invalid: {e}")).fg(Color::Red)
        }
    }
}

fn targets(service: &ExchangeRateService, catalog: &Catalog) -> String {
    let mut labels: Vec<String> = service
        .target_currencies
        .iter()
        .map(|id| catalog.code(*id))
        .collect();
    labels.extend(service.target_accounts.iter().map(|id| {
        catalog
            .account(*id)
            .map_or_else(|| format!("account {}", id.0), |a| a.name.clone())
    }));
    labels.join(", ")
}

fn services_table(
    services: &[ExchangeRateService],
    last_fetches: &[Option<DateTime<Utc>>],
    catalog: &Catalog,
) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Name"),
        ui::header_cell("Provider"),
        ui::header_cell("Schedule"),
        ui::header_cell("Targets"),
        ui::header_cell("Last fetch"),
    ]);

    for (service, last_fetch) in services.iter().zip(last_fetches) {
        let mut name = service.name.clone();
        if service.singleton {
            name.push_str(" (singleton)");
        }
        let name = if service.is_active {
            Cell::new(name)
        } else {
            Cell::new(format!("{name} (inactive)")).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            name,
            Cell::new(service.service_type),
            schedule_cell(service),
            Cell::new(targets(service, catalog)),
            ui::format_optional_cell(*last_fetch, ui::format_timestamp),
        ]);
    }
    table
}
