use super::ui;
use crate::core::config::AppConfig;
use crate::core::{CacheDiagnostics, Currency, FetchOutcome, RateSnapshot, RatesReply};
use crate::providers::RatesApiClient;
use anyhow::{Result, bail};
use comfy_table::{Cell, Color};
use std::time::Duration;
use tracing::warn;

/// A snapshot plus whatever the source could tell about how it was obtained.
pub(crate) struct LoadedRates {
    pub snapshot: RateSnapshot,
    pub notice: Option<String>,
    pub diagnostics: Option<CacheDiagnostics>,
}

/// Polls a running server when `server` is given, otherwise polls the provider in-process.
pub(crate) async fn load_rates(config: &AppConfig, server: Option<&str>) -> Result<LoadedRates> {
    let pb = ui::new_spinner("Fetching rates...");

    let loaded = match server {
        Some(url) => {
            let client =
                RatesApiClient::new(url, Duration::from_secs(config.provider.timeout_secs))?;
            let snapshot = client.fetch_snapshot().await;
            pb.finish_and_clear();
            LoadedRates {
                snapshot: snapshot?,
                notice: None,
                diagnostics: None,
            }
        }
        None => {
            let service = crate::build_service(config)?;
            let reply = service.poll().await;
            pb.finish_and_clear();
            match reply {
                RatesReply::Served { snapshot, notice } => LoadedRates {
                    snapshot,
                    notice,
                    diagnostics: Some(service.diagnostics().await),
                },
                RatesReply::Failed(err) => {
                    bail!("{} (HTTP {})", err, err.http_status())
                }
            }
        }
    };

    if loaded.snapshot.stale {
        warn!(observed_at = %loaded.snapshot.observed_at, "Serving stale rates");
    }
    Ok(loaded)
}

pub fn display_snapshot(snapshot: &RateSnapshot) -> String {
    let base = Currency::BASE;
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Rate ({base} per unit)")),
    ]);

    for currency in Currency::QUOTED {
        let rate = snapshot.rate_for(currency).unwrap_or_default();
        table.add_row(vec![Cell::new(currency.code()), ui::amount_cell(rate, 0)]);
    }

    let freshness = if snapshot.stale {
        ui::style_text("stale", ui::StyleType::Warning)
    } else {
        ui::style_text("fresh", ui::StyleType::TotalValue)
    };

    let mut output = format!("{}\n\n", ui::style_text("Exchange rates", ui::StyleType::Title));
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {} ({})",
        ui::style_text("Observed at:", ui::StyleType::TotalLabel),
        snapshot.observed_at.to_rfc3339(),
        freshness
    ));
    output
}

pub fn display_diagnostics(diagnostics: &CacheDiagnostics) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Recorded at"),
        ui::header_cell("Outcome"),
        ui::header_cell("Failed attempts"),
        ui::header_cell("Next attempt"),
        ui::header_cell("Upstream status"),
    ]);

    for entry in &diagnostics.history {
        let outcome = match entry.outcome {
            FetchOutcome::Ok => Cell::new("ok").fg(Color::Green),
            FetchOutcome::Error => Cell::new("error").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(entry.fetched_at.to_rfc3339()),
            outcome,
            Cell::new(entry.failed_attempts),
            Cell::new(entry.next_eligible_at.to_rfc3339()),
            ui::format_optional_cell(entry.last_status_code, |s| s.to_string()),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Cache history", ui::StyleType::Title),
        table
    )
}

pub async fn run(config: &AppConfig, server: Option<&str>) -> Result<()> {
    let loaded = load_rates(config, server).await?;

    if let Some(notice) = &loaded.notice {
        println!("{}\n", ui::style_text(notice, ui::StyleType::Error));
    }
    println!("{}", display_snapshot(&loaded.snapshot));

    if let Some(diagnostics) = &loaded.diagnostics {
        println!();
        println!("{}", display_diagnostics(diagnostics));
    }
    Ok(())
}
