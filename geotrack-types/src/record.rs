use crate::coordinate::Coordinate;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Indexed position of one entity.
///
/// One record exists per entity id and is overwritten in place on every
/// accepted position report. The geohash is derived from the coordinate by
/// the index writer; the fields are read-only so the two cannot drift apart
/// after construction.
///
/// Serialized shape:
///
/// ```json
/// {"entity_id": "courier-7", "geohash": "u33dc0cpp",
///  "latitude": 52.52, "longitude": 13.405,
///  "updated_at": {"secs_since_epoch": 1700000000, "nanos_since_epoch": 0}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPointRecord {
    entity_id: String,
    geohash: String,
    #[serde(flatten)]
    coordinate: Coordinate,
    updated_at: SystemTime,
}

impl GeoPointRecord {
    /// Assemble a record. Callers are responsible for `geohash` being the
    /// encoding of `coordinate` at the system precision.
    pub fn new(
        entity_id: impl Into<String>,
        coordinate: Coordinate,
        geohash: impl Into<String>,
        updated_at: SystemTime,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            geohash: geohash.into(),
            coordinate,
            updated_at,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn geohash(&self) -> &str {
        &self.geohash
    }

    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }
}

/// A single report from the location feed.
///
/// Timestamps come from the device and may arrive out of order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub entity_id: String,
    pub coordinate: Coordinate,
    pub timestamp: SystemTime,
}

impl LocationUpdate {
    pub fn new(entity_id: impl Into<String>, coordinate: Coordinate, timestamp: SystemTime) -> Self {
        Self {
            entity_id: entity_id.into(),
            coordinate,
            timestamp,
        }
    }

    /// A report stamped with the current wall-clock time.
    pub fn now(entity_id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self::new(entity_id, coordinate, SystemTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_record_document_shape() {
        let record = GeoPointRecord::new(
            "courier-7",
            Coordinate::new(52.52, 13.405),
            "u33dc0cpp",
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entity_id"], "courier-7");
        assert_eq!(json["geohash"], "u33dc0cpp");
        assert_eq!(json["latitude"], 52.52);
        assert_eq!(json["longitude"], 13.405);

        let back: GeoPointRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_location_update_now_is_recent() {
        let before = SystemTime::now();
        let update = LocationUpdate::now("a", Coordinate::new(0.0, 0.0));
        assert!(update.timestamp >= before);
        assert_eq!(update.entity_id, "a");
    }
}
