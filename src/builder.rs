//! Builder for configuring a [`GeoIndex`].

use crate::config::{Config, RetryPolicy};
use crate::error::Result;
use crate::index::GeoIndex;
use crate::storage::{IndexStore, MemoryStore};
use std::sync::Arc;

/// Builder for index configuration. The configuration is validated when the
/// index is built.
#[derive(Debug, Clone, Default)]
pub struct GeoIndexBuilder {
    config: Config,
}

impl GeoIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn geohash_precision(mut self, precision: usize) -> Self {
        self.config.geohash_precision = precision;
        self
    }

    pub fn jitter_threshold(mut self, meters: f64) -> Self {
        self.config.jitter_threshold_meters = meters;
        self
    }

    pub fn max_query_cells(mut self, cells: usize) -> Self {
        self.config.max_query_cells = cells;
        self
    }

    pub fn reject_stale_updates(mut self, reject: bool) -> Self {
        self.config.reject_stale_updates = reject;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build an in-memory index.
    pub fn build(self) -> Result<GeoIndex<MemoryStore>> {
        self.build_with_store(Arc::new(MemoryStore::new()))
    }

    /// Build an index over an existing store.
    pub fn build_with_store<S: IndexStore>(self, store: Arc<S>) -> Result<GeoIndex<S>> {
        self.config.validate()?;
        Ok(GeoIndex::with_store(store, self.config))
    }
}
