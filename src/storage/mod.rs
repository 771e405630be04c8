//! Store abstraction for the spatial index.
//!
//! The index needs only three primitives from its backing store:
//!
//! - point read/write by entity id ([`IndexStore::get`], [`IndexStore::put`],
//!   [`IndexStore::delete`]),
//! - an ordered range scan over geohash keys ([`IndexStore::scan`]),
//! - a change-notification stream filterable by key range
//!   ([`IndexStore::watch`]).
//!
//! Any document or key/value store that can provide these is a valid
//! backend. Implementations must emit exactly one [`IndexChange`] per
//! successful `put` or `delete` and report transport failures as
//! [`GeoError::IndexUnavailable`](crate::GeoError::IndexUnavailable).
//! Nothing beyond per-record atomicity is assumed.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::planner::GeohashInterval;
use futures::stream::BoxStream;
use geotrack_types::record::GeoPointRecord;
use std::future::Future;

/// Stream of index mutations, ended when the store shuts the watch down.
pub type ChangeStream = BoxStream<'static, IndexChange>;

/// A single committed mutation of the index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexChange {
    Upserted {
        previous: Option<GeoPointRecord>,
        current: GeoPointRecord,
    },
    Removed {
        previous: GeoPointRecord,
    },
}

impl IndexChange {
    pub fn entity_id(&self) -> &str {
        match self {
            IndexChange::Upserted { current, .. } => current.entity_id(),
            IndexChange::Removed { previous } => previous.entity_id(),
        }
    }

    pub fn previous(&self) -> Option<&GeoPointRecord> {
        match self {
            IndexChange::Upserted { previous, .. } => previous.as_ref(),
            IndexChange::Removed { previous } => Some(previous),
        }
    }

    pub fn current(&self) -> Option<&GeoPointRecord> {
        match self {
            IndexChange::Upserted { current, .. } => Some(current),
            IndexChange::Removed { .. } => None,
        }
    }

    /// True when the old or the new geohash falls inside one of `ranges`,
    /// i.e. the change can affect membership of a region scanned by them.
    pub fn touches(&self, ranges: &[GeohashInterval]) -> bool {
        self.previous()
            .into_iter()
            .chain(self.current())
            .any(|r| ranges.iter().any(|range| range.contains(r.geohash())))
    }
}

/// Backing store for geo point records.
///
/// Methods return `Send` futures so callers can drive them from spawned
/// tasks; implementations may simply write `async fn`.
pub trait IndexStore: Send + Sync + 'static {
    /// Read the record for `entity_id`.
    fn get(&self, entity_id: &str)
    -> impl Future<Output = Result<Option<GeoPointRecord>>> + Send;

    /// Insert or overwrite the record keyed by its entity id. Returns the
    /// record it replaced.
    fn put(
        &self,
        record: GeoPointRecord,
    ) -> impl Future<Output = Result<Option<GeoPointRecord>>> + Send;

    /// Remove the record for `entity_id`, returning it if it existed.
    fn delete(
        &self,
        entity_id: &str,
    ) -> impl Future<Output = Result<Option<GeoPointRecord>>> + Send;

    /// All records whose geohash lies in `interval`, ordered by geohash and
    /// then entity id.
    fn scan(
        &self,
        interval: &GeohashInterval,
    ) -> impl Future<Output = Result<Vec<GeoPointRecord>>> + Send;

    /// Subscribe to changes. With `Some(ranges)` only changes whose previous
    /// or current geohash falls in one of the ranges are delivered; `None`
    /// delivers everything. Dropping the stream cancels the watch.
    fn watch(&self, ranges: Option<Vec<GeohashInterval>>) -> Result<ChangeStream>;
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Records currently stored
    pub record_count: usize,
    /// Open change watches
    pub watchers: usize,
    /// Range scans served
    pub scans: u64,
    /// Successful puts and deletes
    pub writes: u64,
    /// Change notifications delivered to watchers
    pub notifications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotrack_types::coordinate::Coordinate;
    use std::time::SystemTime;

    fn record(id: &str, hash: &str) -> GeoPointRecord {
        GeoPointRecord::new(id, Coordinate::new(0.0, 0.0), hash, SystemTime::now())
    }

    #[test]
    fn test_change_touches_either_side() {
        let ranges = vec![GeohashInterval::for_cell("s00")];
        let moved_out = IndexChange::Upserted {
            previous: Some(record("a", "s00abcdef")),
            current: record("a", "u00000000"),
        };
        let moved_in = IndexChange::Upserted {
            previous: None,
            current: record("b", "s00bcdefg"),
        };
        let elsewhere = IndexChange::Upserted {
            previous: Some(record("c", "u11111111")),
            current: record("c", "u22222222"),
        };
        let removed = IndexChange::Removed {
            previous: record("d", "s00zzzzzz"),
        };

        assert!(moved_out.touches(&ranges));
        assert!(moved_in.touches(&ranges));
        assert!(!elsewhere.touches(&ranges));
        assert!(removed.touches(&ranges));
        assert_eq!(removed.entity_id(), "d");
        assert!(removed.current().is_none());
    }
}
