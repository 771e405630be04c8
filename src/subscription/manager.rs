use super::worker::{Members, Registry, Worker};
use super::{Control, Subscription, SubscriptionEvent, SubscriptionId, SubscriptionStatus};
use crate::config::RetryPolicy;
use crate::error::{GeoError, Result};
use crate::executor::QueryExecutor;
use crate::storage::IndexStore;
use geotrack_types::query::{DeltaEvent, DeltaKind, QueryDescriptor};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Owns every live subscription over one store.
///
/// Construct one per index and share it by reference; there is no global
/// registry. Subscribing spawns a task, so it must be called from within a
/// Tokio runtime.
pub struct SubscriptionManager<S: IndexStore> {
    executor: Arc<QueryExecutor<S>>,
    registry: Arc<Registry>,
    retry: RetryPolicy,
}

impl<S: IndexStore> SubscriptionManager<S> {
    pub fn new(executor: Arc<QueryExecutor<S>>, retry: RetryPolicy) -> Self {
        Self {
            executor,
            registry: Arc::new(Registry::default()),
            retry,
        }
    }

    /// Start a live query.
    ///
    /// The region is evaluated once before this returns and every initial
    /// member is queued as an `Entered` delta, ordered by entity id. The
    /// change watch is opened first, so writes racing with the initial
    /// evaluation are still observed.
    pub async fn subscribe(&self, descriptor: QueryDescriptor) -> Result<Subscription> {
        let plan = self.executor.planner().plan(&descriptor)?;
        let changes = self
            .executor
            .store()
            .watch(Some(plan.intervals().to_vec()))?;
        let hits = self.executor.execute_plan(&descriptor, &plan).await?;

        let id = SubscriptionId::new();
        let control = Arc::new(Control::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut initial: Vec<DeltaEvent> = hits
            .iter()
            .map(|hit| DeltaEvent::new(hit.entity_id.clone(), DeltaKind::Entered, hit.coordinate))
            .collect();
        initial.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        for delta in initial {
            // The receiver is still local, so this cannot fail.
            let _ = tx.send(SubscriptionEvent::Delta(delta));
        }

        let members: Members = hits
            .into_iter()
            .map(|hit| (hit.entity_id, hit.coordinate))
            .collect();

        info!(
            "subscription {} opened: radius {}m around ({}, {}), {} interval(s), {} initial member(s)",
            id,
            descriptor.radius_meters,
            descriptor.center.latitude,
            descriptor.center.longitude,
            plan.intervals().len(),
            members.len()
        );

        self.registry.insert(id, control.clone());
        let worker = Worker {
            id,
            descriptor,
            plan,
            executor: self.executor.clone(),
            changes,
            members,
            events: tx,
            control: control.clone(),
            registry: self.registry.clone(),
            retry: self.retry,
        };
        tokio::spawn(worker.run());

        Ok(Subscription {
            id,
            events: rx,
            _guard: control.cancel.clone().drop_guard(),
            control,
        })
    }

    /// Stop delivering deltas. Membership is kept and reconciled on resume.
    pub fn pause(&self, id: SubscriptionId) -> Result<()> {
        let control = self.control(id)?;
        if !control.pause() {
            return Err(GeoError::SubscriptionClosed(id));
        }
        debug!("subscription {} paused", id);
        Ok(())
    }

    /// Resume delivery, first emitting whatever changed while paused.
    pub fn resume(&self, id: SubscriptionId) -> Result<()> {
        let control = self.control(id)?;
        if !control.resume() {
            return Err(GeoError::SubscriptionClosed(id));
        }
        debug!("subscription {} resumed", id);
        Ok(())
    }

    /// Close the subscription. No delta is delivered after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let (_, control) = self
            .registry
            .remove(&id)
            .ok_or(GeoError::SubscriptionClosed(id))?;
        if !control.detach() {
            return Err(GeoError::SubscriptionClosed(id));
        }
        info!("subscription {} unsubscribed", id);
        Ok(())
    }

    /// Status of `id`; unknown or removed subscriptions report `Closed`.
    pub fn status(&self, id: SubscriptionId) -> SubscriptionStatus {
        self.registry
            .get(&id)
            .map(|control| control.status())
            .unwrap_or(SubscriptionStatus::Closed)
    }

    /// Number of open subscriptions.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Close every subscription.
    pub fn shutdown(&self) {
        let ids: Vec<SubscriptionId> = self.registry.iter().map(|entry| *entry.key()).collect();
        let closed = ids
            .into_iter()
            .filter(|id| self.unsubscribe(*id).is_ok())
            .count();
        info!("subscription manager shut down, {} subscription(s) closed", closed);
    }

    fn control(&self, id: SubscriptionId) -> Result<Arc<Control>> {
        self.registry
            .get(&id)
            .map(|control| control.clone())
            .ok_or(GeoError::SubscriptionClosed(id))
    }
}

impl<S: IndexStore> Drop for SubscriptionManager<S> {
    fn drop(&mut self) {
        for entry in self.registry.iter() {
            entry.value().detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::planner::QueryPlanner;
    use crate::storage::MemoryStore;
    use crate::writer::IndexWriter;
    use geotrack_types::coordinate::Coordinate;
    use std::time::Duration;

    fn setup() -> (IndexWriter<MemoryStore>, SubscriptionManager<MemoryStore>) {
        let config = Config::default();
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(QueryExecutor::new(
            store.clone(),
            QueryPlanner::from_config(&config),
        ));
        (
            IndexWriter::new(store, &config),
            SubscriptionManager::new(executor, config.retry),
        )
    }

    async fn next_delta(sub: &mut Subscription) -> DeltaEvent {
        tokio::time::timeout(Duration::from_secs(5), sub.next_event())
            .await
            .expect("timed out waiting for delta")
            .and_then(SubscriptionEvent::into_delta)
            .expect("delta event")
    }

    #[tokio::test]
    async fn test_initial_members_enter_in_id_order() -> Result<()> {
        let (writer, manager) = setup();
        writer.upsert("b", Coordinate::new(0.001, 0.0)).await?;
        writer.upsert("a", Coordinate::new(0.002, 0.0)).await?;
        writer.upsert("far", Coordinate::new(1.0, 1.0)).await?;

        let mut sub = manager
            .subscribe(QueryDescriptor::new(Coordinate::new(0.0, 0.0), 1_000.0))
            .await?;

        let first = next_delta(&mut sub).await;
        let second = next_delta(&mut sub).await;
        assert_eq!((first.entity_id.as_str(), first.kind), ("a", DeltaKind::Entered));
        assert_eq!((second.entity_id.as_str(), second.kind), ("b", DeltaKind::Entered));
        assert!(sub.try_next_event().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_operations_on_closed_subscription() -> Result<()> {
        let (_writer, manager) = setup();
        let sub = manager
            .subscribe(QueryDescriptor::new(Coordinate::new(0.0, 0.0), 500.0))
            .await?;
        let id = sub.id();

        assert_eq!(manager.len(), 1);
        manager.pause(id)?;
        assert_eq!(manager.status(id), SubscriptionStatus::Paused);
        manager.resume(id)?;
        assert_eq!(manager.status(id), SubscriptionStatus::Active);

        manager.unsubscribe(id)?;
        assert_eq!(sub.status(), SubscriptionStatus::Closed);
        assert_eq!(manager.status(id), SubscriptionStatus::Closed);
        assert!(matches!(manager.unsubscribe(id), Err(GeoError::SubscriptionClosed(_))));
        assert!(matches!(manager.pause(id), Err(GeoError::SubscriptionClosed(_))));
        assert!(matches!(manager.resume(id), Err(GeoError::SubscriptionClosed(_))));
        assert!(manager.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_rejected() {
        let (_writer, manager) = setup();
        let result = manager
            .subscribe(QueryDescriptor::new(Coordinate::new(0.0, 0.0), 0.0))
            .await;
        assert!(matches!(result, Err(GeoError::InvalidQuery(_))));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_all() -> Result<()> {
        let (_writer, manager) = setup();
        let a = manager
            .subscribe(QueryDescriptor::new(Coordinate::new(0.0, 0.0), 500.0))
            .await?;
        let b = manager
            .subscribe(QueryDescriptor::new(Coordinate::new(10.0, 10.0), 500.0))
            .await?;

        manager.shutdown();
        assert!(manager.is_empty());
        assert_eq!(a.status(), SubscriptionStatus::Closed);
        assert_eq!(b.status(), SubscriptionStatus::Closed);
        Ok(())
    }
}
