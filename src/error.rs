//! Error types for geotrack.

use crate::subscription::SubscriptionId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    /// Latitude/longitude out of range or not finite. Never retried.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Malformed geohash. Signals a programming error or corrupted data.
    #[error("invalid geohash '{hash}': {reason}")]
    InvalidHash { hash: String, reason: String },

    #[error("geohash precision must be between 1 and 12, got {0}")]
    InvalidPrecision(usize),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backing store could not be reached. Retryable with backoff.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// Operation on a subscription that is already closed. Not fatal.
    #[error("subscription {0} is closed")]
    SubscriptionClosed(SubscriptionId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GeoError {
    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeoError::IndexUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(GeoError::IndexUnavailable("timeout".into()).is_retryable());
        assert!(!GeoError::InvalidCoordinate("lat".into()).is_retryable());
        assert!(!GeoError::SubscriptionClosed(SubscriptionId::new()).is_retryable());
    }

    #[test]
    fn test_hash_error_message() {
        let err = GeoError::InvalidHash {
            hash: "abc".into(),
            reason: "character 'a' is not base-32".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid geohash 'abc': character 'a' is not base-32"
        );
    }
}
