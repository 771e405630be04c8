//! Geohash-indexed positions of moving entities, with one-shot radius
//! queries and live subscriptions that stream entered/updated/exited deltas.
//!
//! The backing store only has to offer point reads and writes, ordered range
//! scans over geohash keys and a change feed (see [`IndexStore`]). Radius
//! queries are planned into a small set of half-open geohash ranges, scanned
//! concurrently, deduplicated and refined by exact great-circle distance.
//!
//! ```rust
//! use geotrack::{Coordinate, GeoIndex, QueryDescriptor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> geotrack::Result<()> {
//! let index = GeoIndex::memory();
//! index.upsert("courier-1", Coordinate::new(40.7128, -74.0060)).await?;
//! index.upsert("courier-2", Coordinate::new(40.7306, -73.9352)).await?;
//!
//! let nearby = index
//!     .query(&QueryDescriptor::new(Coordinate::new(40.7130, -74.0050), 1_000.0))
//!     .await?;
//! assert_eq!(nearby.len(), 1);
//! assert_eq!(nearby[0].entity_id, "courier-1");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod planner;
pub mod spatial;
pub mod storage;
pub mod subscription;
pub mod validation;
pub mod writer;

pub use builder::GeoIndexBuilder;
pub use config::{Config, RetryPolicy};
pub use error::{GeoError, Result};
pub use index::GeoIndex;

pub use geotrack_types::coordinate::{BoundingBox, Coordinate};
pub use geotrack_types::query::{DeltaEvent, DeltaKind, QueryDescriptor, QueryHit};
pub use geotrack_types::record::{GeoPointRecord, LocationUpdate};

pub use planner::{GeohashInterval, QueryPlan, QueryPlanner};
pub use spatial::haversine_distance;

pub use storage::{ChangeStream, IndexChange, IndexStore, MemoryStore, StorageStats};

pub use subscription::{
    Subscription, SubscriptionEvent, SubscriptionId, SubscriptionManager, SubscriptionStatus,
};

pub use writer::{IngestStats, UpsertOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoError, GeoIndex, GeoIndexBuilder, Result};

    pub use crate::{Coordinate, DeltaEvent, DeltaKind, QueryDescriptor, QueryHit};

    pub use crate::{Subscription, SubscriptionEvent, SubscriptionStatus};

    pub use crate::{Config, RetryPolicy};

    pub use crate::{IndexStore, MemoryStore};

    pub use std::time::Duration;
}
