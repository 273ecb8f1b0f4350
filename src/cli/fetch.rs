use super::ui;
use crate::core::fetcher::{ExchangeRateFetcher, FetchReport, ServiceOutcome};
use comfy_table::{Cell, Color, Table};

pub async fn run(fetcher: &mut ExchangeRateFetcher, force: bool) -> anyhow::Result<()> {
    let report = fetcher.fetch_due_rates(force).await;

    if report.services.is_empty() {
        println!("No active exchange rate services configured.");
        return Ok(());
    }

    println!(
        "\n{}",
        ui::style_text("Exchange rate fetch", ui::StyleType::Title)
    );
    println!("{}", report_table(&report));

    let failures = report.failures();
    if failures > 0 {
        println!(
            "{}",
            ui::style_text(
                &format!("{failures} service(s) failed, see log for details"),
                ui::StyleType::Error
            )
        );
    }
    Ok(())
}

fn outcome_cell(outcome: &ServiceOutcome) -> Cell {
    let color = match outcome {
        ServiceOutcome::Fetched { .. } => Color::Green,
        ServiceOutcome::NotDue => Color::DarkGrey,
        ServiceOutcome::NoPairs | ServiceOutcome::MissingApiKey => Color::Yellow,
        ServiceOutcome::Failed(_) => Color::Red,
    };
    Cell::new(outcome.to_string()).fg(color)
}

fn report_table(report: &FetchReport) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Service"), ui::header_cell("Result")]);
    for (name, outcome) in &report.services {
        table.add_row(vec![Cell::new(name), outcome_cell(outcome)]);
    }
    table
}
