use geotrack::{
    Coordinate, DeltaEvent, DeltaKind, GeoError, GeoIndex, LocationUpdate, QueryDescriptor,
    Subscription, SubscriptionEvent, SubscriptionStatus, UpsertOutcome,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn next_delta(sub: &mut Subscription) -> DeltaEvent {
    match tokio::time::timeout(Duration::from_secs(5), sub.next_event()).await {
        Ok(Some(SubscriptionEvent::Delta(delta))) => delta,
        Ok(Some(SubscriptionEvent::Terminated(e))) => panic!("subscription terminated: {}", e),
        Ok(None) => panic!("subscription stream ended"),
        Err(_) => panic!("timed out waiting for a delta"),
    }
}

/// Give the worker time to process anything in flight, then assert silence.
async fn assert_quiet(sub: &mut Subscription) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Some(event) = sub.try_next_event() {
        panic!("unexpected event: {:?}", event);
    }
}

fn origin_region() -> QueryDescriptor {
    QueryDescriptor::new(Coordinate::new(0.0, 0.0), 1_000.0)
}

/// Entities entering, leaving and moving within a 1km region around (0, 0).
#[tokio::test]
async fn test_live_membership_scenario() {
    init_logging();
    let index = GeoIndex::memory();
    let mut sub = index.subscribe(origin_region()).await.unwrap();
    assert_quiet(&mut sub).await;

    index.upsert("A", Coordinate::new(0.005, 0.005)).await.unwrap();
    let delta = next_delta(&mut sub).await;
    assert_eq!(delta.entity_id, "A");
    assert_eq!(delta.kind, DeltaKind::Entered);
    assert_eq!(delta.coordinate, Coordinate::new(0.005, 0.005));

    index.upsert("A", Coordinate::new(0.02, 0.02)).await.unwrap();
    let delta = next_delta(&mut sub).await;
    assert_eq!(delta.entity_id, "A");
    assert_eq!(delta.kind, DeltaKind::Exited);
    assert_eq!(delta.coordinate, Coordinate::new(0.005, 0.005));

    index.upsert("B", Coordinate::new(0.0, 0.0)).await.unwrap();
    let delta = next_delta(&mut sub).await;
    assert_eq!((delta.entity_id.as_str(), delta.kind), ("B", DeltaKind::Entered));

    index.upsert("B", Coordinate::new(0.001, 0.0)).await.unwrap();
    let delta = next_delta(&mut sub).await;
    assert_eq!((delta.entity_id.as_str(), delta.kind), ("B", DeltaKind::Updated));
    assert_eq!(delta.coordinate, Coordinate::new(0.001, 0.0));

    assert_quiet(&mut sub).await;
}

/// Moves entirely outside the region never reach the subscriber.
#[tokio::test]
async fn test_unrelated_writes_are_silent() {
    init_logging();
    let index = GeoIndex::memory();
    let mut sub = index.subscribe(origin_region()).await.unwrap();

    index.upsert("far", Coordinate::new(45.0, 45.0)).await.unwrap();
    index.upsert("far", Coordinate::new(45.1, 45.1)).await.unwrap();
    index.upsert("edge", Coordinate::new(0.0, 0.05)).await.unwrap();
    assert_quiet(&mut sub).await;
}

#[tokio::test]
async fn test_remove_emits_exit() {
    init_logging();
    let index = GeoIndex::memory();
    index.upsert("c1", Coordinate::new(0.001, 0.001)).await.unwrap();

    let mut sub = index.subscribe(origin_region()).await.unwrap();
    assert_eq!(next_delta(&mut sub).await.kind, DeltaKind::Entered);

    assert!(index.remove("c1").await.unwrap());
    let delta = next_delta(&mut sub).await;
    assert_eq!(delta.kind, DeltaKind::Exited);
    assert_eq!(delta.coordinate, Coordinate::new(0.001, 0.001));
}

/// Re-sending the same position is a no-op for observers.
#[tokio::test]
async fn test_idempotent_upsert_notifies_once() {
    init_logging();
    let index = GeoIndex::memory();
    let mut sub = index.subscribe(origin_region()).await.unwrap();

    let here = Coordinate::new(0.002, 0.002);
    assert_eq!(index.upsert("x", here).await.unwrap(), UpsertOutcome::Inserted);
    for _ in 0..5 {
        assert_eq!(index.upsert("x", here).await.unwrap(), UpsertOutcome::Unchanged);
    }

    assert_eq!(next_delta(&mut sub).await.kind, DeltaKind::Entered);
    assert_quiet(&mut sub).await;
    assert_eq!(index.store().stats().writes, 1);
}

#[tokio::test]
async fn test_pause_suppresses_and_resume_reconciles() {
    init_logging();
    let index = GeoIndex::memory();
    index.upsert("stays", Coordinate::new(0.001, 0.0)).await.unwrap();
    index.upsert("leaves", Coordinate::new(0.002, 0.0)).await.unwrap();

    let mut sub = index.subscribe(origin_region()).await.unwrap();
    assert_eq!(next_delta(&mut sub).await.entity_id, "leaves");
    assert_eq!(next_delta(&mut sub).await.entity_id, "stays");

    index.pause(sub.id()).unwrap();
    assert_eq!(sub.status(), SubscriptionStatus::Paused);

    index.upsert("leaves", Coordinate::new(1.0, 1.0)).await.unwrap();
    index.upsert("joins", Coordinate::new(0.0, 0.003)).await.unwrap();
    index.upsert("stays", Coordinate::new(0.0015, 0.0)).await.unwrap();
    assert_quiet(&mut sub).await;

    index.resume(sub.id()).unwrap();
    let reconciled = [
        next_delta(&mut sub).await,
        next_delta(&mut sub).await,
        next_delta(&mut sub).await,
    ];
    let summary: Vec<(&str, DeltaKind)> = reconciled
        .iter()
        .map(|d| (d.entity_id.as_str(), d.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("leaves", DeltaKind::Exited),
            ("joins", DeltaKind::Entered),
            ("stays", DeltaKind::Updated),
        ]
    );
    assert_quiet(&mut sub).await;
}

#[tokio::test]
async fn test_no_deltas_after_unsubscribe() {
    init_logging();
    let index = GeoIndex::memory();
    let mut sub = index.subscribe(origin_region()).await.unwrap();
    let id = sub.id();

    index.upsert("a", Coordinate::new(0.001, 0.0)).await.unwrap();
    index.unsubscribe(id).unwrap();
    index.upsert("b", Coordinate::new(0.002, 0.0)).await.unwrap();

    assert!(sub.next_event().await.is_none());
    assert_eq!(index.subscription_status(id), SubscriptionStatus::Closed);
    assert!(matches!(
        index.unsubscribe(id),
        Err(GeoError::SubscriptionClosed(closed)) if closed == id
    ));
}

/// Dropping the handle is the same as unsubscribing.
#[tokio::test]
async fn test_dropping_handle_closes_subscription() {
    init_logging();
    let index = GeoIndex::memory();
    let sub = index.subscribe(origin_region()).await.unwrap();
    let id = sub.id();
    assert_eq!(index.subscriptions().len(), 1);

    drop(sub);
    for _ in 0..50 {
        if index.subscriptions().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(index.subscriptions().is_empty());
    assert_eq!(index.subscription_status(id), SubscriptionStatus::Closed);
    assert_eq!(index.store().stats().watchers, 0);
}

#[tokio::test]
async fn test_query_ordering_cap_and_boundary() {
    init_logging();
    let index = GeoIndex::memory();
    index.upsert("n1", Coordinate::new(0.001, 0.0)).await.unwrap();
    index.upsert("n3", Coordinate::new(0.003, 0.0)).await.unwrap();
    index.upsert("n2", Coordinate::new(0.0, 0.002)).await.unwrap();
    index.upsert("out", Coordinate::new(0.01, 0.0)).await.unwrap();

    let hits = index.query(&origin_region()).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n2", "n3"]);

    let capped = index
        .query(&origin_region().with_result_cap(2))
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[1].entity_id, "n2");

    // A radius equal to an entity's exact distance still includes it.
    let exact = hits[2].distance_meters;
    let boundary = index
        .query(&QueryDescriptor::new(Coordinate::new(0.0, 0.0), exact))
        .await
        .unwrap();
    assert_eq!(boundary.len(), 3);
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected() {
    init_logging();
    let index = GeoIndex::memory();

    assert!(matches!(
        index.upsert("a", Coordinate::new(-90.5, 0.0)).await,
        Err(GeoError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        index.upsert("a", Coordinate::new(0.0, 180.01)).await,
        Err(GeoError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        index
            .query(&QueryDescriptor::new(Coordinate::new(0.0, 0.0), f64::NAN))
            .await,
        Err(GeoError::InvalidQuery(_))
    ));
    assert!(matches!(
        index
            .query(&QueryDescriptor::new(Coordinate::new(0.0, 0.0), 10.0).with_result_cap(0))
            .await,
        Err(GeoError::InvalidQuery(_))
    ));
    assert!(index.store().is_empty());
}

#[tokio::test]
async fn test_out_of_order_feed_keeps_latest() {
    init_logging();
    let index = GeoIndex::memory();
    let t0 = SystemTime::now();

    let feed = futures::stream::iter(vec![
        LocationUpdate::new("courier", Coordinate::new(0.0, 0.001), t0 + Duration::from_secs(2)),
        LocationUpdate::new("courier", Coordinate::new(0.0, 0.009), t0),
        LocationUpdate::new("courier", Coordinate::new(0.0, 0.002), t0 + Duration::from_secs(3)),
    ]);
    let stats = index.ingest(feed).await.unwrap();
    assert_eq!(stats.written, 2);
    assert_eq!(stats.stale, 1);

    let record = index.get("courier").await.unwrap().unwrap();
    assert_eq!(record.coordinate(), Coordinate::new(0.0, 0.002));
}

/// Concurrent writers and several subscribers over one index.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_converge() {
    init_logging();
    let index = Arc::new(GeoIndex::memory());
    let mut sub = index.subscribe(origin_region()).await.unwrap();

    let mut writers = Vec::new();
    for w in 0..4 {
        let index = index.clone();
        writers.push(tokio::spawn(async move {
            for step in 0..20 {
                let id = format!("courier-{}-{}", w, step % 5);
                let lat = 0.0001 * (step as f64 + 1.0);
                index.upsert(&id, Coordinate::new(lat, 0.0001 * w as f64)).await?;
            }
            Ok::<(), GeoError>(())
        }));
    }
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    // Replay the deltas and compare with a fresh query.
    let expected = index.query(&origin_region()).await.unwrap();
    let mut members = std::collections::BTreeMap::new();
    while members.len() < expected.len()
        || expected
            .iter()
            .any(|hit| members.get(&hit.entity_id) != Some(&hit.coordinate))
    {
        let delta = next_delta(&mut sub).await;
        match delta.kind {
            DeltaKind::Entered | DeltaKind::Updated => {
                members.insert(delta.entity_id, delta.coordinate);
            }
            DeltaKind::Exited => {
                members.remove(&delta.entity_id);
            }
        }
    }
    assert_eq!(members.len(), 20);
}
