use crate::core::snapshot::RateSnapshot;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for a running ratekeeper's `GET /rates`.
pub struct RatesApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl RatesApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ratekeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RatesApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn fetch_snapshot(&self) -> Result<RateSnapshot> {
        let url = format!("{}/rates", self.base_url);
        debug!("Requesting rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach rate server at {url}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {url}"))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(anyhow!("Rate server returned HTTP {}: {}", status, reason));
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse rates from {url}. Response: '{text}'"))
    }
}
