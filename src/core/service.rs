//! The `/rates` request handler.
//!
//! Each [`RatesService::poll`] models one inbound client poll: it decides
//! whether the upstream provider may be called, reconciles the outcome into
//! the [`RateCache`] and returns a transport-independent [`RatesReply`].

use crate::core::cache::{CacheDiagnostics, CachePolicy, RateCache};
use crate::core::clock::Clock;
use crate::core::error::{FetchError, RatesError};
use crate::core::provider::QuoteProvider;
use crate::core::snapshot::RateSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Upstream statuses absorbed by backoff and stale serving.
pub const RECOVERABLE_STATUSES: [u16; 4] = [401, 422, 429, 503];

pub fn is_recoverable(status: u16) -> bool {
    RECOVERABLE_STATUSES.contains(&status)
}

/// What a poll produced, before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RatesReply {
    /// A snapshot served with HTTP 200. `notice` carries the configuration
    /// error text when the credential is missing.
    Served {
        snapshot: RateSnapshot,
        notice: Option<String>,
    },
    Failed(RatesError),
}

#[derive(Serialize)]
struct SnapshotBody<'a> {
    #[serde(flatten)]
    snapshot: &'a RateSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct FailureBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale: Option<bool>,
}

impl RatesReply {
    fn served(snapshot: RateSnapshot) -> Self {
        RatesReply::Served {
            snapshot,
            notice: None,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RatesReply::Served { .. } => 200,
            RatesReply::Failed(err) => err.http_status(),
        }
    }

    pub fn snapshot(&self) -> Option<&RateSnapshot> {
        match self {
            RatesReply::Served { snapshot, .. } => Some(snapshot),
            RatesReply::Failed(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            RatesReply::Served { snapshot, notice } => serde_json::to_vec(&SnapshotBody {
                snapshot,
                error: notice.as_deref(),
            }),
            RatesReply::Failed(err) => serde_json::to_vec(&FailureBody {
                error: err.to_string(),
                stale: err.marks_stale().then_some(true),
            }),
        }
    }
}

type KeyLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Upstream credential, looked up again on every poll so that a key removed
/// from the environment stops being sent upstream.
#[derive(Clone)]
pub struct Credential {
    env_var: String,
    lookup: Arc<KeyLookup>,
}

impl Credential {
    /// Reads the key from the process environment variable `env_var`.
    pub fn from_env(env_var: impl Into<String>) -> Self {
        Self::with_lookup(env_var, |name| std::env::var(name).ok())
    }

    pub fn with_lookup(
        env_var: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            env_var: env_var.into(),
            lookup: Arc::new(lookup),
        }
    }

    /// A key that never changes; `None` models an unset variable.
    pub fn fixed(env_var: impl Into<String>, api_key: Option<&str>) -> Self {
        let api_key = api_key.map(str::to_string);
        Self::with_lookup(env_var, move |_| api_key.clone())
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// The current key. Empty values count as absent.
    pub fn api_key(&self) -> Option<String> {
        (self.lookup)(&self.env_var).filter(|key| !key.trim().is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("env_var", &self.env_var)
            .finish_non_exhaustive()
    }
}

pub struct RatesService {
    cache: Mutex<RateCache>,
    /// Held for the duration of an upstream call so only one is in flight.
    refresh_gate: Mutex<()>,
    provider: Arc<dyn QuoteProvider>,
    clock: Arc<dyn Clock>,
    credential: Credential,
}

impl RatesService {
    pub fn new(
        policy: CachePolicy,
        provider: Arc<dyn QuoteProvider>,
        clock: Arc<dyn Clock>,
        credential: Credential,
    ) -> Self {
        Self {
            cache: Mutex::new(RateCache::new(policy)),
            refresh_gate: Mutex::new(()),
            provider,
            clock,
            credential,
        }
    }

    pub async fn diagnostics(&self) -> CacheDiagnostics {
        self.cache.lock().await.diagnostics()
    }

    #[instrument(name = "RatesPoll", skip(self))]
    pub async fn poll(&self) -> RatesReply {
        let Some(api_key) = self.credential.api_key() else {
            return self.missing_credential().await;
        };

        if let Some(snapshot) = self.cached_if_current(self.clock.now()).await {
            debug!("Serving cached rates");
            return RatesReply::served(snapshot);
        }

        let _refresh = match self.refresh_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(snapshot) = self.cache.lock().await.snapshot(false) {
                    debug!("Refresh already in flight, serving cached rates");
                    return RatesReply::served(snapshot);
                }
                self.refresh_gate.lock().await
            }
        };

        // Another poll may have refreshed while this one waited for the gate.
        let now = self.clock.now();
        if let Some(snapshot) = self.cached_if_current(now).await {
            debug!("Rates refreshed by a concurrent poll");
            return RatesReply::served(snapshot);
        }

        debug!("Requesting fresh rates from provider");
        match self.provider.fetch_quotes(&api_key).await {
            Ok(quotes) => {
                let snapshot = RateSnapshot::fresh(quotes, now);
                self.cache.lock().await.record_success(snapshot.clone(), now);
                info!(
                    usd = snapshot.usd_to_base,
                    eur = snapshot.eur_to_base,
                    usdt = snapshot.usdt_to_base,
                    "Rates refreshed"
                );
                RatesReply::served(snapshot)
            }
            Err(FetchError::Status { status }) if is_recoverable(status) => {
                self.absorb_failure(Some(status), now, RatesError::UpstreamRecoverable { status })
                    .await
            }
            Err(FetchError::Status { status }) => {
                error!(status, "Unexpected upstream status, cache left untouched");
                RatesReply::Failed(RatesError::UpstreamUnexpected { status })
            }
            Err(err) => {
                warn!(error = %err, "Rate provider unreachable");
                self.absorb_failure(None, now, RatesError::Unavailable).await
            }
        }
    }

    async fn cached_if_current(&self, now: DateTime<Utc>) -> Option<RateSnapshot> {
        let cache = self.cache.lock().await;
        if cache.should_fetch(now) {
            None
        } else {
            cache.snapshot(false)
        }
    }

    async fn missing_credential(&self) -> RatesReply {
        let env_var = self.credential.env_var();
        match self.cache.lock().await.snapshot(true) {
            Some(snapshot) => {
                warn!(env_var = %env_var, "API key missing, serving stale rates");
                RatesReply::Served {
                    snapshot,
                    notice: Some(format!("{env_var} missing")),
                }
            }
            None => {
                error!(env_var = %env_var, "API key missing and nothing cached");
                RatesReply::Failed(RatesError::MissingCredential {
                    env_var: env_var.to_string(),
                })
            }
        }
    }

    async fn absorb_failure(
        &self,
        status: Option<u16>,
        now: DateTime<Utc>,
        no_fallback: RatesError,
    ) -> RatesReply {
        let mut cache = self.cache.lock().await;
        let fallback = cache.record_failure(status, now);
        let retry_at = cache.latest().map(|entry| entry.next_eligible_at);
        drop(cache);

        match fallback {
            Some(snapshot) => {
                warn!(?status, ?retry_at, "Refresh failed, serving stale rates");
                RatesReply::served(snapshot)
            }
            None => {
                error!(?status, ?retry_at, "Refresh failed with nothing cached");
                RatesReply::Failed(no_fallback)
            }
        }
    }
}
