//! Geohash encoding, decoding and neighbor lookup.
//!
//! Bounding-box decoding delegates to the `geohash` crate. Encoding is done
//! here by plain interval bisection so that the closed upper edges of the
//! world (`90.0`, `180.0`) land in the topmost / eastmost cells rather than
//! depending on float bit tricks. Neighbor lookup is done here as well:
//! `geohash::neighbor` wraps latitude too, so the cell north of `upb` comes
//! back as `h00` at the south pole. Here a top (bottom) row cell has no
//! north (south) neighbors, while longitude still wraps at the antimeridian.
//!
//! # Boundary behavior
//!
//! Encoding bisects the longitude/latitude ranges with `f64` midpoints. A
//! coordinate lying exactly on a cell edge belongs to the upper (north or
//! east) cell.
//! Because each extra character continues the same bisection, a longer hash
//! of the same coordinate always extends the shorter one. Decoded boxes are
//! closed on all sides, so two adjacent boxes share their edge and a point on
//! that edge is contained by both.

use crate::error::{GeoError, Result};
use crate::spatial::wrap_longitude;
use crate::validation::validate_coordinate;
use geotrack_types::coordinate::{BoundingBox, Coordinate};

/// Longest supported geohash (60 bits).
pub const MAX_PRECISION: usize = 12;

/// The geohash base-32 alphabet, in ascending byte order.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encode a coordinate into a geohash of `precision` characters.
///
/// # Examples
///
/// ```rust
/// use geotrack::Coordinate;
/// use geotrack::codec::encode;
///
/// let hash = encode(&Coordinate::new(57.64911, 10.40744), 11).unwrap();
/// assert_eq!(hash, "u4pruydqqvj");
/// ```
pub fn encode(coordinate: &Coordinate, precision: usize) -> Result<String> {
    validate_precision(precision)?;
    validate_coordinate(coordinate)?;

    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lon_lo, mut lon_hi) = (-180.0f64, 180.0f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0usize;
    let mut bit_count = 0;
    let mut is_lon = true;

    while hash.len() < precision {
        let (value, lo, hi) = if is_lon {
            (coordinate.longitude, &mut lon_lo, &mut lon_hi)
        } else {
            (coordinate.latitude, &mut lat_lo, &mut lat_hi)
        };
        let mid = (*lo + *hi) / 2.0;
        if value >= mid {
            bits = (bits << 1) | 1;
            *lo = mid;
        } else {
            bits <<= 1;
            *hi = mid;
        }
        is_lon = !is_lon;

        bit_count += 1;
        if bit_count == 5 {
            hash.push(BASE32[bits] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    Ok(hash)
}

/// Decode a geohash into the cell it denotes.
///
/// Fails with [`GeoError::InvalidHash`] for an empty string, a string longer
/// than [`MAX_PRECISION`], or any character outside the lowercase base-32
/// alphabet.
pub fn decode(hash: &str) -> Result<BoundingBox> {
    validate_hash(hash)?;

    geohash::decode_bbox(hash)
        .map(BoundingBox::from)
        .map_err(|e| GeoError::InvalidHash {
            hash: hash.to_string(),
            reason: e.to_string(),
        })
}

/// The eight cells surrounding a geohash at the same precision.
///
/// Longitude wraps, so the east neighbor of a cell on the antimeridian is
/// the westernmost cell of the same row. There is no cell beyond a pole:
/// for the top row `n`, `ne` and `nw` are `None` (and `s`, `se`, `sw` for
/// the bottom row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbors {
    pub n: Option<String>,
    pub ne: Option<String>,
    pub e: Option<String>,
    pub se: Option<String>,
    pub s: Option<String>,
    pub sw: Option<String>,
    pub w: Option<String>,
    pub nw: Option<String>,
}

impl Neighbors {
    /// Present neighbors, clockwise from north.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            &self.n, &self.ne, &self.e, &self.se, &self.s, &self.sw, &self.w, &self.nw,
        ]
        .into_iter()
        .filter_map(|h| h.as_deref())
    }
}

/// Compute the neighbors of `hash`.
///
/// # Examples
///
/// ```rust
/// use geotrack::codec::neighbors;
///
/// let nb = neighbors("u4pruyd").unwrap();
/// assert_eq!(nb.iter().count(), 8);
/// ```
pub fn neighbors(hash: &str) -> Result<Neighbors> {
    let cell = decode(hash)?;
    let precision = hash.len();
    let center = cell.center();
    let (height, width) = (cell.lat_span(), cell.lon_span());

    let step = |dlat: f64, dlon: f64| -> Result<Option<String>> {
        let lat = center.latitude + dlat * height;
        if !(-90.0..=90.0).contains(&lat) {
            return Ok(None);
        }
        let lon = wrap_longitude(center.longitude + dlon * width);
        encode(&Coordinate::new(lat, lon), precision).map(Some)
    };

    Ok(Neighbors {
        n: step(1.0, 0.0)?,
        ne: step(1.0, 1.0)?,
        e: step(0.0, 1.0)?,
        se: step(-1.0, 1.0)?,
        s: step(-1.0, 0.0)?,
        sw: step(-1.0, -1.0)?,
        w: step(0.0, -1.0)?,
        nw: step(1.0, -1.0)?,
    })
}

/// Cell size in degrees `(latitude, longitude)` at `precision`.
///
/// Bits alternate starting with longitude, so odd precisions carry one more
/// longitude bit than latitude bit.
pub fn cell_dimensions(precision: usize) -> (f64, f64) {
    let bits = (precision * 5) as i32;
    let lon_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lon_bits))
}

/// Add one to a geohash read as a base-32 number of fixed length.
///
/// Every geohash of at least this length that starts with `hash` sorts in
/// `[hash, increment(hash))`. Returns `None` when `hash` is all `z`, i.e. the
/// range runs to the end of the key space.
///
/// ```rust
/// use geotrack::codec::increment;
///
/// assert_eq!(increment("u4p").as_deref(), Some("u4q"));
/// assert_eq!(increment("u4z").as_deref(), Some("u50"));
/// assert_eq!(increment("zz"), None);
/// ```
pub fn increment(hash: &str) -> Option<String> {
    let mut bytes = hash.as_bytes().to_vec();
    for i in (0..bytes.len()).rev() {
        let idx = BASE32.iter().position(|&c| c == bytes[i])?;
        match BASE32.get(idx + 1) {
            Some(&next) => {
                bytes[i] = next;
                return String::from_utf8(bytes).ok();
            }
            None => bytes[i] = BASE32[0],
        }
    }
    None
}

pub(crate) fn validate_precision(precision: usize) -> Result<()> {
    if (1..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(GeoError::InvalidPrecision(precision))
    }
}

fn validate_hash(hash: &str) -> Result<()> {
    let invalid = |reason: String| GeoError::InvalidHash {
        hash: hash.to_string(),
        reason,
    };

    if hash.is_empty() {
        return Err(invalid("empty geohash".to_string()));
    }
    if hash.len() > MAX_PRECISION {
        return Err(invalid(format!(
            "length {} exceeds maximum precision {}",
            hash.len(),
            MAX_PRECISION
        )));
    }
    if let Some(c) = hash.chars().find(|c| !c.is_ascii() || !BASE32.contains(&(*c as u8))) {
        return Err(invalid(format!("character '{}' is not base-32", c)));
    }
    Ok(())
}
