//! One-shot radius queries.

use crate::error::Result;
use crate::planner::{QueryPlan, QueryPlanner};
use crate::spatial::haversine_distance;
use crate::storage::IndexStore;
use futures::future::try_join_all;
use geotrack_types::query::{QueryDescriptor, QueryHit};
use geotrack_types::record::GeoPointRecord;
use log::trace;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// Runs planned range scans against a store and refines the candidates by
/// exact distance.
pub struct QueryExecutor<S: IndexStore> {
    store: Arc<S>,
    planner: QueryPlanner,
}

impl<S: IndexStore> QueryExecutor<S> {
    pub fn new(store: Arc<S>, planner: QueryPlanner) -> Self {
        Self { store, planner }
    }

    /// Every entity within `radius_meters` of the center (boundary
    /// included), nearest first. Equal distances are ordered by entity id.
    /// A result cap keeps only the N nearest.
    pub async fn execute(&self, descriptor: &QueryDescriptor) -> Result<Vec<QueryHit>> {
        let plan = self.planner.plan(descriptor)?;
        self.execute_plan(descriptor, &plan).await
    }

    /// Run an already computed plan. Subscriptions use this to re-evaluate
    /// without planning again.
    pub async fn execute_plan(
        &self,
        descriptor: &QueryDescriptor,
        plan: &QueryPlan,
    ) -> Result<Vec<QueryHit>> {
        let scans = plan
            .intervals()
            .iter()
            .map(|interval| self.store.scan(interval));
        let batches = try_join_all(scans).await?;

        let mut candidates = 0usize;
        let records = batches.into_iter().flatten().inspect(|_| candidates += 1);
        let mut hits: Vec<QueryHit> = latest_per_entity(records)
            .into_values()
            .filter_map(|record| refine(descriptor, record))
            .collect();

        hits.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        if let Some(cap) = descriptor.result_cap {
            hits.truncate(cap);
        }

        trace!(
            "query scanned {} interval(s): {} candidate(s), {} hit(s)",
            plan.intervals().len(),
            candidates,
            hits.len()
        );
        Ok(hits)
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// One record per entity. Scans are not guaranteed to read one snapshot, so
/// an entity that moved between two of them can show up twice; the most
/// recently updated copy wins.
fn latest_per_entity(
    records: impl IntoIterator<Item = GeoPointRecord>,
) -> FxHashMap<String, GeoPointRecord> {
    let mut latest: FxHashMap<String, GeoPointRecord> = FxHashMap::default();
    for record in records {
        match latest.entry(record.entity_id().to_string()) {
            Entry::Occupied(mut slot) => {
                if record.updated_at() > slot.get().updated_at() {
                    slot.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    latest
}

fn refine(descriptor: &QueryDescriptor, record: GeoPointRecord) -> Option<QueryHit> {
    let coordinate = record.coordinate();
    let distance = haversine_distance(&descriptor.center, &coordinate);
    (distance <= descriptor.radius_meters).then(|| QueryHit {
        entity_id: record.entity_id().to_string(),
        coordinate,
        distance_meters: distance,
    })
}
