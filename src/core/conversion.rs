//! Converts amounts between quoted currencies and the base unit.
//!
//! Rates in a [`RateSnapshot`] are already expressed in base units per foreign
//! unit, so conversion is a plain multiply or divide. Invalid input never
//! panics or errors: it yields 0.

use crate::core::currency::Currency;
use crate::core::snapshot::RateSnapshot;
use serde::{Deserialize, Serialize};

/// Rounding applied to every base-unit amount produced by [`Converter::to_base_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Whole base units.
    Whole,
    /// One decimal place.
    #[default]
    Tenths,
}

impl Precision {
    pub fn round(self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        match self {
            Precision::Whole => value.round(),
            Precision::Tenths => (value * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Converter {
    precision: Precision,
}

impl Converter {
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Rounds an arbitrary base amount with this converter's policy.
    pub fn round_base(&self, value: f64) -> f64 {
        self.precision.round(value)
    }

    /// `amount` of `currency` expressed in base units, rounded.
    ///
    /// Returns 0 for a negative or non-finite amount, and for a quoted
    /// currency whose rate is missing, zero, negative or non-finite.
    pub fn to_base_unit(
        &self,
        amount: f64,
        currency: Currency,
        snapshot: Option<&RateSnapshot>,
    ) -> f64 {
        if !amount.is_finite() || amount < 0.0 {
            return 0.0;
        }
        if currency.is_base() {
            return self.round_base(amount);
        }
        match usable_rate(snapshot, currency) {
            Some(rate) => self.round_base(amount * rate),
            None => 0.0,
        }
    }

    /// Inverse of [`Converter::to_base_unit`], unrounded.
    ///
    /// Base amounts pass through unchanged for the base currency; a quoted
    /// currency without a usable rate yields 0.
    pub fn from_base_unit(
        &self,
        base_amount: f64,
        currency: Currency,
        snapshot: Option<&RateSnapshot>,
    ) -> f64 {
        if currency.is_base() {
            return base_amount;
        }
        match usable_rate(snapshot, currency) {
            Some(rate) => base_amount / rate,
            None => 0.0,
        }
    }
}

fn usable_rate(snapshot: Option<&RateSnapshot>, currency: Currency) -> Option<f64> {
    snapshot
        .and_then(|s| s.rate_for(currency))
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(usd: f64, eur: f64, usdt: f64) -> RateSnapshot {
        RateSnapshot {
            usd_to_base: usd,
            eur_to_base: eur,
            usdt_to_base: usdt,
            observed_at: Utc::now(),
            stale: false,
        }
    }

    #[test]
    fn test_exact_multiplication() {
        let rates = snapshot(600.0, 550.0, 600.0);
        for precision in [Precision::Whole, Precision::Tenths] {
            let converter = Converter::new(precision);
            assert_eq!(converter.to_base_unit(100.0, Currency::Usd, Some(&rates)), 60_000.0);
            assert_eq!(converter.to_base_unit(2.0, Currency::Eur, Some(&rates)), 1_100.0);
        }
    }

    #[test]
    fn test_negative_or_non_finite_amount_is_zero() {
        let rates = snapshot(600.0, 550.0, 600.0);
        let converter = Converter::default();
        assert_eq!(converter.to_base_unit(-5.0, Currency::Usd, Some(&rates)), 0.0);
        assert_eq!(converter.to_base_unit(f64::NAN, Currency::Usd, Some(&rates)), 0.0);
        assert_eq!(converter.to_base_unit(f64::INFINITY, Currency::Eur, Some(&rates)), 0.0);
        assert_eq!(converter.to_base_unit(-1.0, Currency::Irt, None), 0.0);
    }

    #[test]
    fn test_unusable_rate_is_zero() {
        let converter = Converter::default();
        for bad in [0.0, -600.0, f64::NAN, f64::INFINITY] {
            let rates = snapshot(bad, bad, bad);
            for amount in [0.0, 1.0, 12.5, 1e9] {
                for currency in Currency::QUOTED {
                    assert_eq!(converter.to_base_unit(amount, currency, Some(&rates)), 0.0);
                }
            }
        }
        assert_eq!(converter.to_base_unit(10.0, Currency::Usdt, None), 0.0);
    }

    #[test]
    fn test_base_currency_is_only_rounded() {
        let tenths = Converter::new(Precision::Tenths);
        let whole = Converter::new(Precision::Whole);
        assert_eq!(tenths.to_base_unit(1234.56, Currency::Irt, None), 1234.6);
        assert_eq!(whole.to_base_unit(1234.56, Currency::Irt, None), 1235.0);
        assert_eq!(whole.to_base_unit(1234.4, Currency::Irt, None), 1234.0);
    }

    #[test]
    fn test_quoted_path_uses_same_precision() {
        let rates = snapshot(61_234.0, 66_000.0, 61_000.0);
        assert_eq!(
            Converter::new(Precision::Tenths).to_base_unit(0.123, Currency::Usd, Some(&rates)),
            7531.8
        );
        assert_eq!(
            Converter::new(Precision::Whole).to_base_unit(0.123, Currency::Usd, Some(&rates)),
            7532.0
        );
    }

    #[test]
    fn test_overflowing_product_is_zero() {
        let rates = snapshot(f64::MAX, 1.0, 1.0);
        assert_eq!(
            Converter::default().to_base_unit(10.0, Currency::Usd, Some(&rates)),
            0.0
        );
    }

    #[test]
    fn test_from_base_unit() {
        let rates = snapshot(600.0, 500.0, 0.0);
        let converter = Converter::default();
        assert_eq!(converter.from_base_unit(60_000.0, Currency::Usd, Some(&rates)), 100.0);
        assert_eq!(converter.from_base_unit(750.0, Currency::Eur, Some(&rates)), 1.5);
        // no rounding on the way back
        assert_eq!(converter.from_base_unit(1.0, Currency::Usd, Some(&rates)), 1.0 / 600.0);
        assert_eq!(converter.from_base_unit(123.45, Currency::Irt, None), 123.45);
        assert_eq!(converter.from_base_unit(60_000.0, Currency::Usdt, Some(&rates)), 0.0);
        assert_eq!(converter.from_base_unit(60_000.0, Currency::Usd, None), 0.0);
    }

    #[test]
    fn test_precision_deserializes_from_config_names() {
        let whole: Precision = serde_yaml::from_str("whole").unwrap();
        let tenths: Precision = serde_yaml::from_str("tenths").unwrap();
        assert_eq!(whole, Precision::Whole);
        assert_eq!(tenths, Precision::Tenths);
        assert_eq!(Precision::default(), Precision::Tenths);
    }
}
