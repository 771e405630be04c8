//! Couriers moving through a city while a dispatcher watches a pickup zone.
//!
//! Run with `RUST_LOG=debug cargo run --example courier_tracking` to see the
//! index's own logging.

use geotrack::prelude::*;
use geotrack::LocationUpdate;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::init();

    let index = Arc::new(GeoIndex::builder().geohash_precision(9).build()?);

    // Pickup zone: 800m around a restaurant in central London.
    let restaurant = Coordinate::new(51.5136, -0.1365);
    let zone = QueryDescriptor::new(restaurant, 800.0);

    let mut dispatcher = index.subscribe(zone.clone()).await?;
    println!("Watching {}m around ({}, {})", zone.radius_meters, restaurant.latitude, restaurant.longitude);

    let routes: Vec<(&str, Coordinate, (f64, f64))> = vec![
        ("courier-ana", Coordinate::new(51.5230, -0.1500), (-0.0015, 0.0020)),
        ("courier-ben", Coordinate::new(51.5140, -0.1370), (0.0020, 0.0015)),
        ("courier-cy", Coordinate::new(51.5000, -0.1200), (0.0010, -0.0010)),
    ];

    let mut couriers = Vec::new();
    for (id, start, (dlat, dlon)) in routes {
        let index = index.clone();
        couriers.push(tokio::spawn(async move {
            for step in 0..10 {
                let position = Coordinate::new(
                    start.latitude + dlat * step as f64,
                    start.longitude + dlon * step as f64,
                );
                index.apply_update(LocationUpdate::now(id, position)).await?;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok::<(), GeoError>(())
        }));
    }

    let watcher = tokio::spawn(async move {
        while let Some(event) = dispatcher.next_event().await {
            match event {
                SubscriptionEvent::Delta(delta) => println!(
                    "  {:<12} {:?} at ({:.4}, {:.4})",
                    delta.entity_id, delta.kind, delta.coordinate.latitude, delta.coordinate.longitude
                ),
                SubscriptionEvent::Terminated(e) => {
                    println!("  subscription terminated: {}", e);
                    break;
                }
            }
        }
    });

    for courier in couriers {
        courier.await??;
    }

    let nearest = index.query(&zone.clone().with_result_cap(3)).await?;
    println!("\nNearest couriers to the restaurant:");
    for hit in &nearest {
        println!("  {:<12} {:>7.1}m", hit.entity_id, hit.distance_meters);
    }

    let plan = index.plan(&zone)?;
    println!(
        "\nZone is scanned as {} range(s) over {} cell(s) at precision {}",
        plan.intervals().len(),
        plan.cells().len(),
        plan.precision()
    );

    index.subscriptions().shutdown();
    watcher.await?;
    Ok(())
}
