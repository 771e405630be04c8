use geo::{Coord, Point, Rect};
use serde::{Deserialize, Serialize};

/// A WGS84 position expressed as latitude/longitude degrees.
///
/// Construction does not validate; the index rejects out-of-range values
/// on write. Use [`Coordinate::is_valid`] for a quick check.
///
/// # Examples
///
/// ```
/// use geotrack_types::coordinate::Coordinate;
/// use geo::Point;
///
/// let c = Coordinate::new(40.7128, -74.0060);
/// let p: Point<f64> = c.into();
/// assert_eq!(p.x(), -74.0060);
/// assert_eq!(p.y(), 40.7128);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// True when both components are finite and inside
    /// latitude [-90, 90] / longitude [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Project onto a `geo` point (x = longitude, y = latitude).
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(c: Coordinate) -> Self {
        c.to_point()
    }
}

impl From<Coordinate> for Coord<f64> {
    fn from(c: Coordinate) -> Self {
        Coord {
            x: c.longitude,
            y: c.latitude,
        }
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(p: Point<f64>) -> Self {
        Self::new(p.y(), p.x())
    }
}

/// Axis-aligned latitude/longitude rectangle, bounds inclusive.
///
/// A box never wraps the antimeridian: `min_lon <= max_lon` always holds.
/// Regions crossing ±180° are represented as two boxes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// The whole globe.
    pub const fn world() -> Self {
        Self::new(-90.0, -180.0, 90.0, 180.0)
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        c.latitude >= self.min_lat
            && c.latitude <= self.max_lat
            && c.longitude >= self.min_lon
            && c.longitude <= self.max_lon
    }

    /// Inclusive overlap test; boxes that only share an edge intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Height in degrees of latitude.
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Width in degrees of longitude.
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().y, rect.min().x, rect.max().y, rect.max().x)
    }
}

impl From<BoundingBox> for Rect<f64> {
    fn from(b: BoundingBox) -> Self {
        Rect::new(
            Coord {
                x: b.min_lon,
                y: b.min_lat,
            },
            Coord {
                x: b.max_lon,
                y: b.max_lat,
            },
        )
    }
}
