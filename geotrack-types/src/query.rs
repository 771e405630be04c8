use crate::coordinate::Coordinate;
use serde::{Deserialize, Serialize};

/// A radius query: everything within `radius_meters` of `center`.
///
/// Descriptors are values. A live subscription keeps the descriptor it was
/// created with; moving the region means subscribing again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub center: Coordinate,
    pub radius_meters: f64,
    /// Keep only the N nearest matches.
    #[serde(default)]
    pub result_cap: Option<usize>,
}

impl QueryDescriptor {
    pub fn new(center: Coordinate, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
            result_cap: None,
        }
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = Some(cap);
        self
    }
}

/// One row of a one-shot query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub entity_id: String,
    pub coordinate: Coordinate,
    /// Great-circle distance from the query center, in meters.
    pub distance_meters: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// The entity became a member of the region.
    Entered,
    /// Still a member, at a new position.
    Updated,
    /// No longer a member (moved out or removed).
    Exited,
}

/// Membership change delivered to a live subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub entity_id: String,
    pub kind: DeltaKind,
    /// Current position for `Entered`/`Updated`; the last in-region
    /// position for `Exited`.
    pub coordinate: Coordinate,
}

impl DeltaEvent {
    pub fn new(entity_id: impl Into<String>, kind: DeltaKind, coordinate: Coordinate) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            coordinate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_to_uncapped() {
        let json = r#"{"center": {"latitude": 1.0, "longitude": 2.0}, "radius_meters": 50.0}"#;
        let d: QueryDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.result_cap, None);
        assert_eq!(d, QueryDescriptor::new(Coordinate::new(1.0, 2.0), 50.0));
    }

    #[test]
    fn test_delta_kind_serializes_snake_case() {
        let ev = DeltaEvent::new("b", DeltaKind::Entered, Coordinate::new(0.0, 0.0));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "entered");
    }
}
