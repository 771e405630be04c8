//! Configuration for the index, planner and live subscriptions.
//!
//! `Config` is plain serde data so it can be loaded from JSON or (with the
//! `toml` feature) TOML and validated in one step.

use crate::codec::MAX_PRECISION;
use crate::error::{GeoError, Result};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule for re-evaluating a live subscription after the index
/// reports itself unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt before the subscription closes.
    #[serde(default = "RetryPolicy::default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "RetryPolicy::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "RetryPolicy::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    const fn default_max_retries() -> u32 {
        5
    }

    const fn default_initial_backoff_ms() -> u64 {
        100
    }

    const fn default_max_backoff_ms() -> u64 {
        5_000
    }

    /// Delay before retry number `attempt` (0-based): the initial backoff
    /// doubled per attempt, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            initial_backoff_ms: Self::default_initial_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
        }
    }
}

/// Index configuration
///
/// # Example
///
/// ```rust
/// use geotrack::Config;
///
/// let json = r#"{
///     "geohash_precision": 8,
///     "jitter_threshold_meters": 2.0,
///     "retry": { "max_retries": 3 }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.geohash_precision, 8);
/// assert_eq!(config.retry.max_retries, 3);
/// assert_eq!(config.retry.initial_backoff_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Precision of stored geohashes (1-12). 9 characters is a cell of
    /// roughly 4.8m x 4.8m.
    #[serde(default = "Config::default_geohash_precision")]
    pub geohash_precision: usize,

    /// Moves shorter than this that stay in the same cell are treated as
    /// GPS jitter: nothing is written and no notification fires.
    #[serde(default = "Config::default_jitter_threshold_meters")]
    pub jitter_threshold_meters: f64,

    /// Upper bound on the number of cells one query plan may enumerate.
    /// The planner picks a coarser precision until the plan fits.
    #[serde(default = "Config::default_max_query_cells")]
    pub max_query_cells: usize,

    /// Drop feed entries whose timestamp is older than the stored record.
    #[serde(default = "Config::default_reject_stale_updates")]
    pub reject_stale_updates: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Config {
    const fn default_geohash_precision() -> usize {
        9
    }

    const fn default_jitter_threshold_meters() -> f64 {
        0.5
    }

    const fn default_max_query_cells() -> usize {
        16
    }

    const fn default_reject_stale_updates() -> bool {
        true
    }

    pub fn with_geohash_precision(mut self, precision: usize) -> Self {
        assert!(
            (1..=MAX_PRECISION).contains(&precision),
            "Geohash precision must be between 1 and 12"
        );
        self.geohash_precision = precision;
        self
    }

    pub fn with_jitter_threshold(mut self, meters: f64) -> Self {
        assert!(
            meters.is_finite() && meters >= 0.0,
            "Jitter threshold must be finite and non-negative"
        );
        self.jitter_threshold_meters = meters;
        self
    }

    pub fn with_max_query_cells(mut self, cells: usize) -> Self {
        assert!(cells > 0, "Max query cells must be greater than zero");
        self.max_query_cells = cells;
        self
    }

    pub fn with_reject_stale_updates(mut self, reject: bool) -> Self {
        self.reject_stale_updates = reject;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PRECISION).contains(&self.geohash_precision) {
            return Err(GeoError::InvalidConfig(format!(
                "geohash_precision must be between 1 and {}, got {}",
                MAX_PRECISION, self.geohash_precision
            )));
        }

        if !self.jitter_threshold_meters.is_finite() || self.jitter_threshold_meters < 0.0 {
            return Err(GeoError::InvalidConfig(format!(
                "jitter_threshold_meters must be finite and non-negative, got {}",
                self.jitter_threshold_meters
            )));
        }

        if self.max_query_cells == 0 {
            return Err(GeoError::InvalidConfig(
                "max_query_cells must be greater than zero".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms == 0 {
            return Err(GeoError::InvalidConfig(
                "retry.initial_backoff_ms must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(GeoError::InvalidConfig(format!(
                "retry.max_backoff_ms ({}) must be >= retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geohash_precision: Self::default_geohash_precision(),
            jitter_threshold_meters: Self::default_jitter_threshold_meters(),
            max_query_cells: Self::default_max_query_cells(),
            reject_stale_updates: Self::default_reject_stale_updates(),
            retry: RetryPolicy::default(),
        }
    }
}
