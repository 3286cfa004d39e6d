//! Rate caching, retry backoff and conversion

pub mod cache;
pub mod clock;
pub mod config;
pub mod conversion;
pub mod currency;
pub mod error;
pub mod log;
pub mod provider;
pub mod service;
pub mod snapshot;

// Re-export main types for cleaner imports
pub use cache::{CacheDiagnostics, CacheEntry, CachePolicy, FetchOutcome, RateCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversion::{Converter, Precision};
pub use currency::Currency;
pub use error::{FetchError, RatesError};
pub use provider::QuoteProvider;
pub use service::{Credential, RatesReply, RatesService};
pub use snapshot::{RateQuotes, RateSnapshot};
