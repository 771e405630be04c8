//! Write path: turns location updates into index records.

use crate::codec;
use crate::config::Config;
use crate::error::{GeoError, Result};
use crate::spatial::haversine_distance;
use crate::storage::IndexStore;
use crate::validation::{validate_coordinate, validate_entity_id};
use futures::{Stream, StreamExt};
use geotrack_types::coordinate::Coordinate;
use geotrack_types::record::{GeoPointRecord, LocationUpdate};
use log::{debug, warn};
use std::sync::Arc;

/// What an upsert did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First record for this entity.
    Inserted,
    /// Existing record overwritten with the new position.
    Moved,
    /// Same cell and within the jitter threshold; nothing written.
    Unchanged,
    /// Older than the stored record; nothing written.
    Stale,
}

impl UpsertOutcome {
    /// Whether the store was written (and watchers notified).
    pub fn is_write(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Moved)
    }
}

/// Counters for a drained location feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub written: usize,
    pub unchanged: usize,
    pub stale: usize,
    /// Updates with an invalid id or coordinate; logged and skipped.
    pub rejected: usize,
}

/// Encodes and stores entity positions.
pub struct IndexWriter<S: IndexStore> {
    store: Arc<S>,
    precision: usize,
    jitter_threshold_meters: f64,
    reject_stale: bool,
}

impl<S: IndexStore> IndexWriter<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self {
            store,
            precision: config.geohash_precision,
            jitter_threshold_meters: config.jitter_threshold_meters,
            reject_stale: config.reject_stale_updates,
        }
    }

    /// Record `coordinate` as the current position of `entity_id`,
    /// timestamped now.
    pub async fn upsert(&self, entity_id: &str, coordinate: Coordinate) -> Result<UpsertOutcome> {
        self.apply(LocationUpdate::now(entity_id, coordinate)).await
    }

    /// Apply one feed entry.
    ///
    /// Invalid input is rejected before the store is touched. Re-applying
    /// an update for the current position does not write, so it produces
    /// no change notification.
    pub async fn apply(&self, update: LocationUpdate) -> Result<UpsertOutcome> {
        validate_entity_id(&update.entity_id)?;
        validate_coordinate(&update.coordinate)?;

        let geohash = codec::encode(&update.coordinate, self.precision)?;
        let previous = self.store.get(&update.entity_id).await?;

        if let Some(prev) = &previous {
            if self.reject_stale && update.timestamp < prev.updated_at() {
                debug!(
                    "dropping stale update for '{}' ({:?} older than stored)",
                    update.entity_id,
                    prev.updated_at()
                        .duration_since(update.timestamp)
                        .unwrap_or_default()
                );
                return Ok(UpsertOutcome::Stale);
            }

            if prev.geohash() == geohash
                && haversine_distance(&prev.coordinate(), &update.coordinate)
                    < self.jitter_threshold_meters
            {
                return Ok(UpsertOutcome::Unchanged);
            }
        }

        let record = GeoPointRecord::new(
            update.entity_id,
            update.coordinate,
            geohash,
            update.timestamp,
        );
        self.store.put(record).await?;

        Ok(if previous.is_some() {
            UpsertOutcome::Moved
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Delete the entity's record. Returns whether one existed.
    pub async fn remove(&self, entity_id: &str) -> Result<bool> {
        validate_entity_id(entity_id)?;
        Ok(self.store.delete(entity_id).await?.is_some())
    }

    /// Drain a feed of updates in order.
    ///
    /// Bad entries are logged and counted; a store failure stops the drain
    /// and is returned.
    pub async fn ingest<U>(&self, updates: U) -> Result<IngestStats>
    where
        U: Stream<Item = LocationUpdate>,
    {
        let mut stats = IngestStats::default();
        let mut updates = std::pin::pin!(updates);

        while let Some(update) = updates.next().await {
            let entity_id = update.entity_id.clone();
            match self.apply(update).await {
                Ok(UpsertOutcome::Inserted | UpsertOutcome::Moved) => stats.written += 1,
                Ok(UpsertOutcome::Unchanged) => stats.unchanged += 1,
                Ok(UpsertOutcome::Stale) => stats.stale += 1,
                Err(e @ (GeoError::InvalidCoordinate(_) | GeoError::InvalidInput(_))) => {
                    warn!("skipping update for '{}': {}", entity_id, e);
                    stats.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "ingested feed: {} written, {} unchanged, {} stale, {} rejected",
            stats.written, stats.unchanged, stats.stale, stats.rejected
        );
        Ok(stats)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
