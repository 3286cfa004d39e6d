use super::{rates, ui};
use crate::core::config::AppConfig;
use crate::core::{Converter, Currency, RateSnapshot};
use anyhow::Result;
use comfy_table::Cell;
use tracing::debug;

/// One row of the conversion table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedAmount {
    pub currency: Currency,
    pub amount: f64,
}

/// Expresses `amount` of `currency` in the base unit and in every other quoted currency.
///
/// The base amount comes first. Currencies without a usable rate come out as 0.
pub fn convert_all(
    converter: &Converter,
    amount: f64,
    currency: Currency,
    snapshot: Option<&RateSnapshot>,
) -> Vec<ConvertedAmount> {
    let base_amount = converter.to_base_unit(amount, currency, snapshot);
    debug!(amount, %currency, base_amount, "Converted to base unit");

    Currency::ALL
        .iter()
        .filter(|c| **c != currency || c.is_base())
        .map(|c| ConvertedAmount {
            currency: *c,
            amount: converter.from_base_unit(base_amount, *c, snapshot),
        })
        .collect()
}

pub fn display_conversion(amount: f64, currency: Currency, rows: &[ConvertedAmount]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Amount")]);

    for row in rows {
        let decimals = if row.currency.is_base() { 1 } else { 2 };
        table.add_row(vec![
            Cell::new(row.currency.code()),
            ui::amount_cell(row.amount, decimals),
        ]);
    }

    let title = format!("{} {}", ui::format_amount(amount, 2), currency);
    let mut output = format!("{}\n\n", ui::style_text(&title, ui::StyleType::Title));
    output.push_str(&table.to_string());

    if let Some(base) = rows.iter().find(|r| r.currency.is_base()) {
        output.push_str(&format!(
            "\n\n{} {}",
            ui::style_text(&format!("Total ({}):", Currency::BASE), ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_amount(base.amount, 1), ui::StyleType::TotalValue)
        ));
    }
    output
}

pub async fn run(
    config: &AppConfig,
    amount: f64,
    currency: &str,
    server: Option<&str>,
) -> Result<()> {
    let currency: Currency = currency.parse()?;
    let converter = Converter::new(config.conversion.precision);

    let loaded = rates::load_rates(config, server).await?;
    if loaded.snapshot.stale {
        println!(
            "{}\n",
            ui::style_text(
                &format!(
                    "Rates are stale (observed at {})",
                    loaded.snapshot.observed_at.to_rfc3339()
                ),
                ui::StyleType::Warning
            )
        );
    }

    let rows = convert_all(&converter, amount, currency, Some(&loaded.snapshot));
    println!("{}", display_conversion(amount, currency, &rows));
    println!(
        "\n{}",
        ui::style_text(
            &format!("Rounded to {:?} {}", converter.precision(), Currency::BASE),
            ui::StyleType::Subtle
        )
    );
    Ok(())
}
