//! Error types for the rate service.

use thiserror::Error;

/// Why a single upstream call produced no quotes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider answered with a non-success HTTP status.
    #[error("Upstream responded with HTTP {status}")]
    Status { status: u16 },

    /// No response at all: connect failure, timeout, reset.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A success response whose body could not be read or decoded.
    #[error("Invalid upstream payload: {0}")]
    Decode(String),
}

/// Client-facing hard failures. Each maps to the HTTP status it is served with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatesError {
    /// Credential missing and nothing cached to fall back to.
    #[error("{env_var} is not configured")]
    MissingCredential { env_var: String },

    /// Recoverable upstream status on an empty cache.
    #[error("Failed to fetch rates")]
    UpstreamRecoverable { status: u16 },

    /// Upstream status outside the recoverable set. Forwarded as-is.
    #[error("Unexpected error from upstream")]
    UpstreamUnexpected { status: u16 },

    /// Network failure on an empty cache.
    #[error("Unable to connect to rate provider")]
    Unavailable,
}

impl RatesError {
    pub fn http_status(&self) -> u16 {
        match self {
            RatesError::MissingCredential { .. } => 500,
            RatesError::UpstreamRecoverable { status } => *status,
            RatesError::UpstreamUnexpected { status } => *status,
            RatesError::Unavailable => 503,
        }
    }

    /// Failures on the retry path tell the client its data would be stale.
    pub fn marks_stale(&self) -> bool {
        matches!(
            self,
            RatesError::UpstreamRecoverable { .. } | RatesError::Unavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let missing = RatesError::MissingCredential {
            env_var: "NAVASAN_API_KEY".to_string(),
        };
        assert_eq!(missing.http_status(), 500);
        assert_eq!(missing.to_string(), "NAVASAN_API_KEY is not configured");
        assert!(!missing.marks_stale());

        assert_eq!(RatesError::UpstreamRecoverable { status: 429 }.http_status(), 429);
        assert!(RatesError::UpstreamRecoverable { status: 429 }.marks_stale());
        assert_eq!(RatesError::UpstreamUnexpected { status: 404 }.http_status(), 404);
        assert!(!RatesError::UpstreamUnexpected { status: 404 }.marks_stale());
        assert_eq!(RatesError::Unavailable.http_status(), 503);
        assert!(RatesError::Unavailable.marks_stale());
    }
}
