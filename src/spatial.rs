//! Great-circle distance and query-region geometry.
//!
//! Distances use the `geo` crate's haversine implementation on a spherical
//! earth of mean radius 6371008.8m. The bounding regions computed here use
//! the same radius so the two agree on where a circle ends.

use geo::{Distance, Haversine};
use geotrack_types::coordinate::{BoundingBox, Coordinate};
use smallvec::{SmallVec, smallvec};

/// Mean earth radius in meters, matching `geo::Haversine`.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Relative slack added to every region so rounding never trims a cell
/// that touches the circle.
const REGION_MARGIN: f64 = 1e-6;

/// Great-circle distance in meters.
///
/// # Examples
///
/// ```rust
/// use geotrack::Coordinate;
/// use geotrack::spatial::haversine_distance;
///
/// let origin = Coordinate::new(0.0, 0.0);
/// let d = haversine_distance(&origin, &Coordinate::new(0.001, 0.0));
/// assert!((d - 111.19).abs() < 0.1);
/// ```
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    Haversine.distance(a.to_point(), b.to_point())
}

/// Axis-aligned regions that together contain every point within
/// `radius_meters` of `center`.
///
/// Returns one box in the common case, two when the circle crosses the
/// antimeridian (split at ±180°), and a full-longitude band when the circle
/// reaches a pole.
pub fn bounding_regions(center: &Coordinate, radius_meters: f64) -> SmallVec<[BoundingBox; 2]> {
    let angular = radius_meters / EARTH_RADIUS_METERS * (1.0 + REGION_MARGIN);
    let dlat = angular.to_degrees();
    let min_lat = center.latitude - dlat;
    let max_lat = center.latitude + dlat;

    if min_lat <= -90.0 || max_lat >= 90.0 {
        return smallvec![BoundingBox::new(
            min_lat.max(-90.0),
            -180.0,
            max_lat.min(90.0),
            180.0,
        )];
    }

    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if ratio >= 1.0 {
        return smallvec![BoundingBox::new(min_lat, -180.0, max_lat, 180.0)];
    }

    let dlon = ratio.asin().to_degrees();
    if dlon >= 180.0 {
        return smallvec![BoundingBox::new(min_lat, -180.0, max_lat, 180.0)];
    }

    let min_lon = center.longitude - dlon;
    let max_lon = center.longitude + dlon;

    if min_lon < -180.0 {
        smallvec![
            BoundingBox::new(min_lat, min_lon + 360.0, max_lat, 180.0),
            BoundingBox::new(min_lat, -180.0, max_lat, max_lon),
        ]
    } else if max_lon > 180.0 {
        smallvec![
            BoundingBox::new(min_lat, min_lon, max_lat, 180.0),
            BoundingBox::new(min_lat, -180.0, max_lat, max_lon - 360.0),
        ]
    } else {
        smallvec![BoundingBox::new(min_lat, min_lon, max_lat, max_lon)]
    }
}

/// Wrap a longitude that stepped past the antimeridian back into
/// [-180, 180].
pub(crate) fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}
