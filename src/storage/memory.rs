//! In-process reference store.

use super::{ChangeStream, IndexChange, IndexStore, StorageStats};
use crate::error::Result;
use crate::planner::GeohashInterval;
use futures::StreamExt;
use geotrack_types::record::GeoPointRecord;
use log::trace;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// In-memory [`IndexStore`] backed by a `BTreeSet` ordered by
/// (geohash, entity id).
///
/// Mutations and their notifications happen under one write lock, so every
/// watcher observes changes in commit order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    scans: AtomicU64,
    writes: AtomicU64,
    notifications: AtomicU64,
}

#[derive(Default)]
struct Inner {
    records: FxHashMap<String, GeoPointRecord>,
    by_geohash: BTreeSet<(String, String)>,
    watchers: Vec<Watcher>,
}

struct Watcher {
    ranges: Option<Vec<GeohashInterval>>,
    tx: mpsc::UnboundedSender<IndexChange>,
}

impl Watcher {
    fn wants(&self, change: &IndexChange) -> bool {
        match &self.ranges {
            Some(ranges) => change.touches(ranges),
            None => true,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    pub fn stats(&self) -> StorageStats {
        let inner = self.inner.read();
        StorageStats {
            record_count: inner.records.len(),
            watchers: inner.watchers.iter().filter(|w| !w.tx.is_closed()).count(),
            scans: self.scans.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }

    /// Fan a change out to interested watchers, dropping closed ones.
    fn notify(&self, inner: &mut Inner, change: IndexChange) {
        let mut delivered = 0;
        inner.watchers.retain(|w| {
            if w.tx.is_closed() {
                return false;
            }
            if !w.wants(&change) {
                return true;
            }
            let sent = w.tx.send(change.clone()).is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });
        self.notifications.fetch_add(delivered, Ordering::Relaxed);
        trace!(
            "change for '{}' delivered to {} watcher(s)",
            change.entity_id(),
            delivered
        );
    }
}

impl IndexStore for MemoryStore {
    async fn get(&self, entity_id: &str) -> Result<Option<GeoPointRecord>> {
        Ok(self.inner.read().records.get(entity_id).cloned())
    }

    async fn put(&self, record: GeoPointRecord) -> Result<Option<GeoPointRecord>> {
        let mut inner = self.inner.write();
        let previous = inner
            .records
            .insert(record.entity_id().to_string(), record.clone());

        if let Some(prev) = &previous {
            inner
                .by_geohash
                .remove(&(prev.geohash().to_string(), prev.entity_id().to_string()));
        }
        inner
            .by_geohash
            .insert((record.geohash().to_string(), record.entity_id().to_string()));
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.notify(
            &mut inner,
            IndexChange::Upserted {
                previous: previous.clone(),
                current: record,
            },
        );
        Ok(previous)
    }

    async fn delete(&self, entity_id: &str) -> Result<Option<GeoPointRecord>> {
        let mut inner = self.inner.write();
        let previous = inner.records.remove(entity_id);

        if let Some(prev) = &previous {
            inner
                .by_geohash
                .remove(&(prev.geohash().to_string(), prev.entity_id().to_string()));
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.notify(
                &mut inner,
                IndexChange::Removed {
                    previous: prev.clone(),
                },
            );
        }
        Ok(previous)
    }

    async fn scan(&self, interval: &GeohashInterval) -> Result<Vec<GeoPointRecord>> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.read();
        let lower = (interval.start().to_string(), String::new());

        Ok(inner
            .by_geohash
            .range(lower..)
            .take_while(|(hash, _)| interval.end().is_none_or(|end| hash.as_str() < end))
            .filter_map(|(_, id)| inner.records.get(id).cloned())
            .collect())
    }

    fn watch(&self, ranges: Option<Vec<GeohashInterval>>) -> Result<ChangeStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().watchers.push(Watcher { ranges, tx });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
