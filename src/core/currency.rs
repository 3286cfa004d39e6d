//! Currency codes understood by the rate service

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Iranian toman, the base unit every total is expressed in.
    Irt,
    Usd,
    Eur,
    Usdt,
}

impl Currency {
    pub const BASE: Currency = Currency::Irt;

    /// Every supported code, base first.
    pub const ALL: [Currency; 4] = [Currency::Irt, Currency::Usd, Currency::Eur, Currency::Usdt];

    /// Currencies the upstream provider quotes against the base unit.
    pub const QUOTED: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Usdt];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Irt => "IRT",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Usdt => "USDT",
        }
    }

    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// Symbol used in the provider's item list and response keys.
    pub fn provider_symbol(&self) -> Option<&'static str> {
        match self {
            Currency::Irt => None,
            Currency::Usd => Some("usd"),
            Currency::Eur => Some("eur"),
            Currency::Usdt => Some("usdt"),
        }
    }

    /// Non-failing variant of `from_str`.
    pub fn parse_opt(code: &str) -> Option<Currency> {
        code.parse().ok()
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IRT" => Ok(Currency::Irt),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "USDT" => Ok(Currency::Usdt),
            _ => Err(anyhow!("Unsupported currency: {}", s)),
        }
    }
}
