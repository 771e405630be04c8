//! Per-subscription evaluation loop.

use super::{Control, SubscriptionEvent, SubscriptionId, SubscriptionStatus};
use crate::config::RetryPolicy;
use crate::error::{GeoError, Result};
use crate::executor::QueryExecutor;
use crate::planner::QueryPlan;
use crate::storage::{ChangeStream, IndexStore};
use dashmap::DashMap;
use futures::{FutureExt, StreamExt};
use geotrack_types::coordinate::Coordinate;
use geotrack_types::query::{DeltaEvent, DeltaKind, QueryDescriptor, QueryHit};
use log::{debug, error, info, trace, warn};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) type Registry = DashMap<SubscriptionId, Arc<Control>>;

/// Membership as last delivered to the subscriber.
pub(crate) type Members = FxHashMap<String, Coordinate>;

pub(crate) struct Worker<S: IndexStore> {
    pub(crate) id: SubscriptionId,
    pub(crate) descriptor: QueryDescriptor,
    pub(crate) plan: QueryPlan,
    pub(crate) executor: Arc<QueryExecutor<S>>,
    pub(crate) changes: ChangeStream,
    pub(crate) members: Members,
    pub(crate) events: mpsc::UnboundedSender<SubscriptionEvent>,
    pub(crate) control: Arc<Control>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) retry: RetryPolicy,
}

enum Step {
    Continue,
    Stop,
}

impl<S: IndexStore> Worker<S> {
    pub(crate) async fn run(mut self) {
        let cancel = self.control.cancel.clone();

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Stop,
                _ = self.control.resume.notified() => {
                    if self.control.take_dirty() {
                        debug!("subscription {} resumed, reconciling", self.id);
                        self.reconcile().await
                    } else {
                        Step::Continue
                    }
                }
                change = self.changes.next() => match change {
                    Some(change) => {
                        let mut relevant = change.touches(self.plan.intervals());
                        // Fold everything already queued into one evaluation.
                        while let Some(Some(queued)) = self.changes.next().now_or_never() {
                            relevant |= queued.touches(self.plan.intervals());
                        }
                        if !relevant {
                            Step::Continue
                        } else if self.control.status() == SubscriptionStatus::Paused {
                            self.control.mark_dirty();
                            Step::Continue
                        } else {
                            self.reconcile().await
                        }
                    }
                    None => {
                        self.terminate(GeoError::IndexUnavailable(
                            "change stream ended".to_string(),
                        ));
                        Step::Stop
                    }
                },
            };

            if let Step::Stop = step {
                break;
            }
        }

        self.control.close();
        self.registry.remove(&self.id);
        info!("subscription {} closed", self.id);
    }

    /// Re-run the query and emit the diff against delivered membership.
    async fn reconcile(&mut self) -> Step {
        let evaluated = tokio::select! {
            biased;
            _ = self.control.cancel.cancelled() => return Step::Stop,
            evaluated = evaluate(
                self.id,
                &*self.executor,
                &self.descriptor,
                &self.plan,
                &self.retry,
            ) => evaluated,
        };
        match evaluated {
            Ok(hits) => self.emit(hits),
            Err(e) => {
                self.terminate(e);
                Step::Stop
            }
        }
    }

    fn emit(&mut self, hits: Vec<QueryHit>) -> Step {
        let deltas = diff(&self.members, &hits);

        let mut state = self.control.state.lock();
        match state.status {
            SubscriptionStatus::Active => {}
            SubscriptionStatus::Paused => {
                state.dirty = true;
                return Step::Continue;
            }
            SubscriptionStatus::Closed => return Step::Stop,
        }

        trace!("subscription {} emitting {} delta(s)", self.id, deltas.len());
        for delta in deltas {
            if self.events.send(SubscriptionEvent::Delta(delta)).is_err() {
                return Step::Stop;
            }
        }
        drop(state);

        self.members = hits
            .into_iter()
            .map(|hit| (hit.entity_id, hit.coordinate))
            .collect();
        Step::Continue
    }

    fn terminate(&self, cause: GeoError) {
        error!("subscription {} terminated: {}", self.id, cause);
        let state = self.control.state.lock();
        if state.status != SubscriptionStatus::Closed {
            let _ = self.events.send(SubscriptionEvent::Terminated(cause));
        }
    }
}

/// Run the plan, retrying transient store failures with backoff.
///
/// Takes fields rather than `&Worker`: the change stream is not `Sync`.
async fn evaluate<S: IndexStore>(
    id: SubscriptionId,
    executor: &QueryExecutor<S>,
    descriptor: &QueryDescriptor,
    plan: &QueryPlan,
    retry: &RetryPolicy,
) -> Result<Vec<QueryHit>> {
    let mut attempt = 0;
    loop {
        match executor.execute_plan(descriptor, plan).await {
            Ok(hits) => return Ok(hits),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.backoff(attempt);
                attempt += 1;
                warn!(
                    "subscription {} evaluation failed (attempt {}/{}), retrying in {:?}: {}",
                    id, attempt, retry.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deltas turning `previous` into the membership given by `hits`: exits,
/// then enters, then updates, each group ordered by entity id.
pub(crate) fn diff(previous: &Members, hits: &[QueryHit]) -> Vec<DeltaEvent> {
    let current: FxHashMap<&str, Coordinate> = hits
        .iter()
        .map(|hit| (hit.entity_id.as_str(), hit.coordinate))
        .collect();

    let mut exits: Vec<DeltaEvent> = previous
        .iter()
        .filter(|(id, _)| !current.contains_key(id.as_str()))
        .map(|(id, coordinate)| DeltaEvent::new(id.clone(), DeltaKind::Exited, *coordinate))
        .collect();

    let mut enters = Vec::new();
    let mut updates = Vec::new();
    for hit in hits {
        match previous.get(&hit.entity_id) {
            None => enters.push(DeltaEvent::new(
                hit.entity_id.clone(),
                DeltaKind::Entered,
                hit.coordinate,
            )),
            Some(before) if *before != hit.coordinate => updates.push(DeltaEvent::new(
                hit.entity_id.clone(),
                DeltaKind::Updated,
                hit.coordinate,
            )),
            Some(_) => {}
        }
    }

    for group in [&mut exits, &mut enters, &mut updates] {
        group.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    }
    exits.into_iter().chain(enters).chain(updates).collect()
}
