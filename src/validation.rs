//! Input validation for coordinates, query descriptors and entity ids.

use crate::error::{GeoError, Result};
use geotrack_types::coordinate::Coordinate;
use geotrack_types::query::QueryDescriptor;

/// Validates latitude [-90.0, 90.0] and longitude [-180.0, 180.0].
///
/// # Examples
///
/// ```
/// use geotrack::validation::validate_coordinate;
/// use geotrack::Coordinate;
///
/// assert!(validate_coordinate(&Coordinate::new(40.7128, -74.0060)).is_ok());
/// assert!(validate_coordinate(&Coordinate::new(95.0, 0.0)).is_err());
/// assert!(validate_coordinate(&Coordinate::new(0.0, 200.0)).is_err());
/// ```
pub fn validate_coordinate(coordinate: &Coordinate) -> Result<()> {
    let (lat, lon) = (coordinate.latitude, coordinate.longitude);

    if !lat.is_finite() {
        return Err(GeoError::InvalidCoordinate(format!(
            "Latitude must be finite, got: {}",
            lat
        )));
    }

    if !lon.is_finite() {
        return Err(GeoError::InvalidCoordinate(format!(
            "Longitude must be finite, got: {}",
            lon
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::InvalidCoordinate(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            lat
        )));
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeoError::InvalidCoordinate(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            lon
        )));
    }

    Ok(())
}

/// Validates a query: the center must be a valid coordinate, the radius
/// finite and positive, and a result cap (if any) non-zero.
pub fn validate_descriptor(descriptor: &QueryDescriptor) -> Result<()> {
    validate_coordinate(&descriptor.center)?;

    let radius = descriptor.radius_meters;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(GeoError::InvalidQuery(format!(
            "Radius must be a positive finite number of meters, got: {}",
            radius
        )));
    }

    if descriptor.result_cap == Some(0) {
        return Err(GeoError::InvalidQuery(
            "Result cap must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_entity_id(entity_id: &str) -> Result<()> {
    if entity_id.is_empty() {
        return Err(GeoError::InvalidInput(
            "Entity id must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_valid() {
        for c in [
            Coordinate::new(90.0, 180.0),
            Coordinate::new(-90.0, -180.0),
            Coordinate::new(0.0, 0.0),
        ] {
            assert!(validate_coordinate(&c).is_ok(), "{:?}", c);
        }
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(matches!(
            validate_coordinate(&Coordinate::new(f64::NAN, 0.0)),
            Err(GeoError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            validate_coordinate(&Coordinate::new(0.0, f64::NEG_INFINITY)),
            Err(GeoError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_descriptor_radius() {
        let center = Coordinate::new(0.0, 0.0);
        assert!(validate_descriptor(&QueryDescriptor::new(center, 10.0)).is_ok());
        assert!(matches!(
            validate_descriptor(&QueryDescriptor::new(center, 0.0)),
            Err(GeoError::InvalidQuery(_))
        ));
        assert!(validate_descriptor(&QueryDescriptor::new(center, -5.0)).is_err());
        assert!(validate_descriptor(&QueryDescriptor::new(center, f64::NAN)).is_err());
    }

    #[test]
    fn test_descriptor_zero_cap() {
        let d = QueryDescriptor::new(Coordinate::new(0.0, 0.0), 10.0).with_result_cap(0);
        assert!(validate_descriptor(&d).is_err());
    }

    #[test]
    fn test_descriptor_bad_center() {
        let d = QueryDescriptor::new(Coordinate::new(100.0, 0.0), 10.0);
        assert!(matches!(
            validate_descriptor(&d),
            Err(GeoError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn test_entity_id() {
        assert!(validate_entity_id("courier-1").is_ok());
        assert!(validate_entity_id("").is_err());
    }
}
