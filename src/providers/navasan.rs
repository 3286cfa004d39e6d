use crate::core::currency::Currency;
use crate::core::error::FetchError;
use crate::core::provider::QuoteProvider;
use crate::core::snapshot::RateQuotes;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Provider item list: every quoted currency's symbol, comma separated.
fn item_list() -> String {
    Currency::QUOTED
        .iter()
        .filter_map(|c| c.provider_symbol())
        .collect::<Vec<_>>()
        .join(",")
}

/// Scales a provider quote into base units, rounding to the nearest integer.
/// Missing, non-numeric, non-finite and non-positive quotes collapse to 0.
pub fn scale_quote(raw: Option<f64>, scale_factor: f64) -> f64 {
    match raw {
        Some(value) if value.is_finite() && value > 0.0 => {
            let scaled = (value / scale_factor).round();
            if scaled.is_finite() && scaled > 0.0 {
                scaled
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// A quote field as the provider sends it: a number, a numeric string, or junk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuoteValue {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

impl QuoteValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            QuoteValue::Number(n) => Some(*n),
            QuoteValue::Text(s) if s.trim().is_empty() => Some(0.0),
            QuoteValue::Text(s) => s.trim().parse().ok(),
            QuoteValue::Other(_) => None,
        }
    }
}

/// Only JSON objects count as items; arrays and scalars are ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NavasanEntry {
    Item(HashMap<String, Option<QuoteValue>>),
    Other(IgnoredAny),
}

impl NavasanEntry {
    fn field(&self, name: &str) -> Option<&QuoteValue> {
        match self {
            NavasanEntry::Item(fields) => fields.get(name)?.as_ref(),
            NavasanEntry::Other(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct NavasanResponse(HashMap<String, NavasanEntry>);

impl NavasanResponse {
    /// `value` wins over `price` whenever it is present.
    fn raw_quote(&self, currency: Currency) -> Option<f64> {
        let entry = self.0.get(currency.provider_symbol()?)?;
        entry.field("value").or(entry.field("price"))?.as_f64()
    }

    fn into_quotes(self, scale_factor: f64) -> RateQuotes {
        let quote = |currency| scale_quote(self.raw_quote(currency), scale_factor);
        RateQuotes::new(
            quote(Currency::Usd),
            quote(Currency::Eur),
            quote(Currency::Usdt),
        )
    }
}

/// Fetches the latest quotes from the Navasan API.
pub struct NavasanProvider {
    base_url: String,
    scale_factor: f64,
    client: reqwest::Client,
}

impl NavasanProvider {
    pub fn new(base_url: &str, scale_factor: f64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ratekeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(NavasanProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            scale_factor,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/latest/", self.base_url)
    }
}

#[async_trait]
impl QuoteProvider for NavasanProvider {
    #[instrument(name = "NavasanFetch", skip_all)]
    async fn fetch_quotes(&self, api_key: &str) -> Result<RateQuotes, FetchError> {
        let endpoint = self.endpoint();
        let items = item_list();
        let url = reqwest::Url::parse_with_params(
            &endpoint,
            &[("item", items.as_str()), ("api_key", api_key)],
        )
        .map_err(|e| FetchError::Transport(format!("Invalid provider URL {endpoint}: {e}")))?;
        debug!(endpoint = %endpoint, items = %items, "Requesting latest quotes");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Provider returned an error status");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.without_url().to_string()))?;

        let data: NavasanResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::Decode(format!("Failed to parse quotes: {e}")))?;

        let quotes = data.into_quotes(self.scale_factor);
        debug!(?quotes, "Received provider quotes");
        Ok(quotes)
    }
}
