pub mod navasan;
pub mod rates_api;

pub use navasan::NavasanProvider;
pub use rates_api::RatesApiClient;
