//! Upstream quote provider abstraction

use crate::core::error::FetchError;
use crate::core::snapshot::RateQuotes;
use async_trait::async_trait;

/// One fresh upstream call per invocation. Implementations must not cache
/// or retry: retries are spread across polls by the cache's backoff.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quotes(&self, api_key: &str) -> Result<RateQuotes, FetchError>;
}
