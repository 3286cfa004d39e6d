//! Rate snapshot types shared by the cache, the HTTP endpoint and conversion

use crate::core::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coerces a rate into the snapshot domain: non-finite or negative values become 0.
pub fn sanitize_rate(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Base-unit rates for each quoted currency, already scaled by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateQuotes {
    pub usd_to_base: f64,
    pub eur_to_base: f64,
    pub usdt_to_base: f64,
}

impl RateQuotes {
    pub fn new(usd_to_base: f64, eur_to_base: f64, usdt_to_base: f64) -> Self {
        Self {
            usd_to_base: sanitize_rate(usd_to_base),
            eur_to_base: sanitize_rate(eur_to_base),
            usdt_to_base: sanitize_rate(usdt_to_base),
        }
    }
}

/// The externally visible quote set, valid as of one upstream fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    pub usd_to_base: f64,
    pub eur_to_base: f64,
    pub usdt_to_base: f64,
    pub observed_at: DateTime<Utc>,
    pub stale: bool,
}

impl RateSnapshot {
    /// A non-stale snapshot built from a successful fetch observed at `observed_at`.
    pub fn fresh(quotes: RateQuotes, observed_at: DateTime<Utc>) -> Self {
        let quotes = RateQuotes::new(quotes.usd_to_base, quotes.eur_to_base, quotes.usdt_to_base);
        Self {
            usd_to_base: quotes.usd_to_base,
            eur_to_base: quotes.eur_to_base,
            usdt_to_base: quotes.usdt_to_base,
            observed_at,
            stale: false,
        }
    }

    /// Zero-filled stand-in recorded when no fetch has ever succeeded.
    pub fn placeholder(observed_at: DateTime<Utc>) -> Self {
        Self {
            usd_to_base: 0.0,
            eur_to_base: 0.0,
            usdt_to_base: 0.0,
            observed_at,
            stale: true,
        }
    }

    /// Rate for a quoted currency. The base currency has no rate.
    pub fn rate_for(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Usd => Some(self.usd_to_base),
            Currency::Eur => Some(self.eur_to_base),
            Currency::Usdt => Some(self.usdt_to_base),
            Currency::Irt => None,
        }
    }

    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_rate() {
        assert_eq!(sanitize_rate(600.0), 600.0);
        assert_eq!(sanitize_rate(-3.0), 0.0);
        assert_eq!(sanitize_rate(f64::NAN), 0.0);
        assert_eq!(sanitize_rate(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_fresh_snapshot_never_carries_invalid_values() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let quotes = RateQuotes {
            usd_to_base: f64::NAN,
            eur_to_base: -1.0,
            usdt_to_base: 61_000.0,
        };
        let snapshot = RateSnapshot::fresh(quotes, at);
        assert_eq!(snapshot.usd_to_base, 0.0);
        assert_eq!(snapshot.eur_to_base, 0.0);
        assert_eq!(snapshot.usdt_to_base, 61_000.0);
        assert!(!snapshot.stale);
    }

    #[test]
    fn test_snapshot_serializes_with_client_field_names() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let snapshot = RateSnapshot::fresh(RateQuotes::new(60_000.0, 65_000.0, 60_500.0), at);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["usdToBase"], 60_000.0);
        assert_eq!(json["eurToBase"], 65_000.0);
        assert_eq!(json["usdtToBase"], 60_500.0);
        assert_eq!(json["observedAt"], "2026-01-02T03:04:05Z");
        assert_eq!(json["stale"], false);
    }

    #[test]
    fn test_rate_lookup() {
        let snapshot = RateSnapshot::placeholder(Utc::now());
        assert_eq!(snapshot.rate_for(Currency::Usd), Some(0.0));
        assert_eq!(snapshot.rate_for(Currency::Irt), None);
        assert!(snapshot.stale);
    }
}
