use super::ui;
use crate::core::Catalog;
use crate::core::model::ExchangeRate;
use crate::store::RateStore;
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment, Color, Table};

pub fn run(store: &dyn RateStore, catalog: &Catalog) -> Result<()> {
    let rates = store.rates().context("Failed to load exchange rates")?;
    if rates.is_empty() {
        println!("No exchange rates stored yet. Run `ratefetch fetch` first.");
        return Ok(());
    }
    println!("\n{}", ui::style_text("Exchange rates", ui::StyleType::Title));
    println!("{}", rates_table(&rates, catalog));
    Ok(())
}

fn rates_table(rates: &[ExchangeRate], catalog: &Catalog) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("From"),
        ui::header_cell("To"),
        ui::header_cell("Rate"),
        ui::header_cell("Date"),
        ui::header_cell("Source"),
    ]);

    // Newest first
    for rate in rates.iter().rev() {
        let source = if rate.automatic {
            Cell::new("automatic")
        } else {
            Cell::new("manual").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(rate.id).set_alignment(CellAlignment::Right),
            Cell::new(catalog.code(rate.from_currency)),
            Cell::new(catalog.code(rate.to_currency)),
            ui::rate_cell(rate.rate),
            Cell::new(ui::format_timestamp(rate.date)),
            source,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Currency, CurrencyId, NewExchangeRate};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rates_table_uses_codes() {
        let currency = |id: u32, code: &str| Currency {
            id: CurrencyId(id),
            code: code.to_string(),
            name: code.to_string(),
            decimal_places: 2,
            exchange_currency: None,
        };
        let catalog = Catalog::new(vec![currency(1, "USD"), currency(2, "EUR")], vec![]).unwrap();
        let rates = vec![
            NewExchangeRate::new(CurrencyId(1), CurrencyId(2), dec!(0.9200), Utc::now(), true)
                .unwrap()
                .with_id(1),
            NewExchangeRate::new(CurrencyId(2), CurrencyId(7), dec!(3), Utc::now(), false)
                .unwrap()
                .with_id(2),
        ];

        let rendered = rates_table(&rates, &catalog).to_string();
        assert!(rendered.contains("USD"));
        assert!(rendered.contains("0.92"));
        assert!(!rendered.contains("0.9200"));
        assert!(rendered.contains("#7"));
        assert!(rendered.contains("manual"));
    }
}
