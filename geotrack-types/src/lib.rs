//! # geotrack-types
//!
//! Plain data types shared by the geotrack index and its callers.
//!
//! - **Coordinates**: `Coordinate`, `BoundingBox`
//! - **Records**: `GeoPointRecord`, `LocationUpdate`
//! - **Queries**: `QueryDescriptor`, `QueryHit`, `DeltaEvent`, `DeltaKind`
//!
//! All types are serializable with Serde and convert to the `geo` crate's
//! primitives where that is useful.
//!
//! ## Examples
//!
//! ```rust
//! use geotrack_types::coordinate::Coordinate;
//! use geotrack_types::query::QueryDescriptor;
//!
//! let depot = Coordinate::new(52.5200, 13.4050);
//! let query = QueryDescriptor::new(depot, 2_000.0).with_result_cap(25);
//! assert_eq!(query.result_cap, Some(25));
//! ```

pub mod coordinate;
pub mod query;
pub mod record;
