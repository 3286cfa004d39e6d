pub mod cli;
pub mod core;
pub mod providers;
pub mod server;

use crate::core::config::AppConfig;
use crate::core::{RatesService, SystemClock};
use crate::providers::NavasanProvider;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Serve {
        listen: Option<String>,
    },
    Rates {
        server: Option<String>,
    },
    Convert {
        amount: f64,
        currency: String,
        server: Option<String>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("ratekeeper starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    config.validate().context("Invalid configuration")?;
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Serve { listen } => cli::serve::run(&config, listen.as_deref()).await,
        AppCommand::Rates { server } => cli::rates::run(&config, server.as_deref()).await,
        AppCommand::Convert {
            amount,
            currency,
            server,
        } => cli::convert::run(&config, amount, &currency, server.as_deref()).await,
    }
}

/// Wires the Navasan provider, the system clock and the configured cache policy.
pub fn build_service(config: &AppConfig) -> Result<RatesService> {
    let provider = NavasanProvider::new(
        &config.provider.base_url,
        config.provider.scale_factor,
        Duration::from_secs(config.provider.timeout_secs),
    )?;
    Ok(RatesService::new(
        config.cache.policy(),
        Arc::new(provider),
        Arc::new(SystemClock),
        config.credential(),
    ))
}
