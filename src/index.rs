//! The index facade: writer, executor and subscription manager over one
//! shared store.

use crate::builder::GeoIndexBuilder;
use crate::config::Config;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::planner::{QueryPlan, QueryPlanner};
use crate::storage::{IndexStore, MemoryStore};
use crate::subscription::{Subscription, SubscriptionId, SubscriptionManager, SubscriptionStatus};
use crate::writer::{IndexWriter, IngestStats, UpsertOutcome};
use futures::Stream;
use geotrack_types::coordinate::Coordinate;
use geotrack_types::query::{QueryDescriptor, QueryHit};
use geotrack_types::record::{GeoPointRecord, LocationUpdate};
use std::sync::Arc;

/// Geohash-indexed positions of moving entities with one-shot and live
/// radius queries.
///
/// Writers and readers share nothing but the store, so a `GeoIndex` can be
/// wrapped in an `Arc` and used from any number of tasks.
///
/// # Examples
///
/// ```rust
/// use geotrack::{Coordinate, DeltaKind, GeoIndex, QueryDescriptor};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> geotrack::Result<()> {
/// let index = GeoIndex::memory();
/// index.upsert("courier-7", Coordinate::new(48.8566, 2.3522)).await?;
///
/// let region = QueryDescriptor::new(Coordinate::new(48.8570, 2.3530), 500.0);
/// let hits = index.query(&region).await?;
/// assert_eq!(hits[0].entity_id, "courier-7");
///
/// let mut live = index.subscribe(region).await?;
/// let first = live.next_event().await.and_then(|e| e.into_delta()).unwrap();
/// assert_eq!(first.kind, DeltaKind::Entered);
/// # Ok(())
/// # }
/// ```
pub struct GeoIndex<S: IndexStore = MemoryStore> {
    config: Config,
    writer: IndexWriter<S>,
    executor: Arc<QueryExecutor<S>>,
    subscriptions: SubscriptionManager<S>,
}

impl GeoIndex<MemoryStore> {
    /// In-memory index with the default configuration.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), Config::default())
    }

    pub fn builder() -> GeoIndexBuilder {
        GeoIndexBuilder::new()
    }
}

impl<S: IndexStore> GeoIndex<S> {
    /// Wire an index over `store`. The configuration is assumed valid; use
    /// [`GeoIndexBuilder`] to have it checked.
    pub fn with_store(store: Arc<S>, config: Config) -> Self {
        let planner = QueryPlanner::from_config(&config);
        let executor = Arc::new(QueryExecutor::new(store.clone(), planner));
        let subscriptions = SubscriptionManager::new(executor.clone(), config.retry);
        let writer = IndexWriter::new(store, &config);

        Self {
            config,
            writer,
            executor,
            subscriptions,
        }
    }

    /// Record the current position of an entity.
    pub async fn upsert(&self, entity_id: &str, coordinate: Coordinate) -> Result<UpsertOutcome> {
        self.writer.upsert(entity_id, coordinate).await
    }

    /// Apply one timestamped feed entry.
    pub async fn apply_update(&self, update: LocationUpdate) -> Result<UpsertOutcome> {
        self.writer.apply(update).await
    }

    /// Drain a location feed into the index.
    pub async fn ingest<U>(&self, updates: U) -> Result<IngestStats>
    where
        U: Stream<Item = LocationUpdate>,
    {
        self.writer.ingest(updates).await
    }

    /// Stop tracking an entity. Live subscriptions that contained it see an
    /// `Exited` delta.
    pub async fn remove(&self, entity_id: &str) -> Result<bool> {
        self.writer.remove(entity_id).await
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<GeoPointRecord>> {
        self.writer.store().get(entity_id).await
    }

    /// Entities within the region, nearest first.
    pub async fn query(&self, descriptor: &QueryDescriptor) -> Result<Vec<QueryHit>> {
        self.executor.execute(descriptor).await
    }

    /// Number of entities within the region, after any result cap.
    pub async fn count_within(&self, descriptor: &QueryDescriptor) -> Result<usize> {
        Ok(self.executor.execute(descriptor).await?.len())
    }

    /// The range scans a query for `descriptor` would issue.
    pub fn plan(&self, descriptor: &QueryDescriptor) -> Result<QueryPlan> {
        self.executor.planner().plan(descriptor)
    }

    /// Open a live subscription. Must be called within a Tokio runtime.
    pub async fn subscribe(&self, descriptor: QueryDescriptor) -> Result<Subscription> {
        self.subscriptions.subscribe(descriptor).await
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.unsubscribe(id)
    }

    pub fn pause(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.pause(id)
    }

    pub fn resume(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.resume(id)
    }

    pub fn subscription_status(&self, id: SubscriptionId) -> SubscriptionStatus {
        self.subscriptions.status(id)
    }

    pub fn subscriptions(&self) -> &SubscriptionManager<S> {
        &self.subscriptions
    }

    pub fn store(&self) -> &Arc<S> {
        self.writer.store()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
