//! Query region planning.
//!
//! A radius query is turned into a short list of half-open geohash key
//! ranges that the store can scan. The planner
//!
//! 1. computes the circle's bounding region(s) (split at the antimeridian,
//!    widened to all longitudes at a pole),
//! 2. picks the finest precision at which those regions touch no more than
//!    `max_cells` cells, so large radii get coarse cells and the scan count
//!    stays bounded regardless of radius,
//! 3. walks outward from the center cell through [`neighbors`] collecting
//!    every cell that intersects a region (3x3 in the common case, more when
//!    the precision had to drop),
//! 4. turns each cell into `[hash, increment(hash))` and merges ranges that
//!    touch.
//!
//! Cells overlapping the circle are never dropped. Cells that merely touch
//! the bounding box are kept too; the executor's distance filter removes
//! their false positives.

use crate::codec::{cell_dimensions, decode, encode, increment, neighbors};
use crate::config::Config;
use crate::error::Result;
use crate::spatial::bounding_regions;
use crate::validation::validate_descriptor;
use geotrack_types::coordinate::{BoundingBox, Coordinate};
use geotrack_types::query::QueryDescriptor;
use log::debug;
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// A `[start, end)` range over geohash keys. `end == None` means the range
/// is unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeohashInterval {
    start: String,
    end: Option<String>,
}

impl GeohashInterval {
    /// The range of every key that starts with `cell`.
    pub fn for_cell(cell: &str) -> Self {
        Self {
            start: cell.to_string(),
            end: increment(cell),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    pub fn contains(&self, hash: &str) -> bool {
        hash >= self.start.as_str() && self.end.as_deref().is_none_or(|end| hash < end)
    }

    /// Extend this interval over `next` when the two touch or overlap.
    fn try_absorb(&mut self, next: &GeohashInterval) -> bool {
        let touches = match self.end.as_deref() {
            None => true,
            Some(end) => end >= next.start.as_str(),
        };
        if !touches {
            return false;
        }
        self.end = match (self.end.take(), next.end.clone()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        true
    }
}

impl fmt::Display for GeohashInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// The output of [`QueryPlanner::plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    precision: usize,
    cells: Vec<String>,
    intervals: Vec<GeohashInterval>,
}

impl QueryPlan {
    /// Geohash precision of the planned cells.
    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Cells covering the query region, sorted.
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Disjoint, sorted scan ranges.
    pub fn intervals(&self) -> &[GeohashInterval] {
        &self.intervals
    }

    /// Whether a stored geohash falls in one of the scan ranges.
    pub fn covers(&self, hash: &str) -> bool {
        self.intervals.iter().any(|i| i.contains(hash))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner {
    index_precision: usize,
    max_cells: usize,
}

impl QueryPlanner {
    pub fn new(index_precision: usize, max_cells: usize) -> Self {
        Self {
            index_precision,
            max_cells: max_cells.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.geohash_precision, config.max_query_cells)
    }

    /// Plan the range scans for a radius query.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use geotrack::{Coordinate, QueryDescriptor};
    /// use geotrack::planner::QueryPlanner;
    ///
    /// let planner = QueryPlanner::new(9, 16);
    /// let center = Coordinate::new(52.52, 13.405);
    /// let plan = planner.plan(&QueryDescriptor::new(center, 1_000.0)).unwrap();
    /// assert!(plan.intervals().len() <= 16);
    ///
    /// let stored = geotrack::codec::encode(&center, 9).unwrap();
    /// assert!(plan.covers(&stored));
    /// ```
    pub fn plan(&self, descriptor: &QueryDescriptor) -> Result<QueryPlan> {
        validate_descriptor(descriptor)?;

        let regions = bounding_regions(&descriptor.center, descriptor.radius_meters);
        let precision = self.choose_precision(&regions);
        let cells = collect_cells(&descriptor.center, &regions, precision)?;

        let intervals = merge_cells(&cells);

        debug!(
            "planned radius {}m around ({}, {}): precision {}, {} cells, {} intervals",
            descriptor.radius_meters,
            descriptor.center.latitude,
            descriptor.center.longitude,
            precision,
            cells.len(),
            intervals.len()
        );

        Ok(QueryPlan {
            precision,
            cells: cells.into_iter().collect(),
            intervals,
        })
    }

    fn choose_precision(&self, regions: &[BoundingBox]) -> usize {
        (1..=self.index_precision)
            .rev()
            .find(|&p| estimate_cells(regions, p) <= self.max_cells)
            .unwrap_or(1)
    }
}

/// Half-open ranges for sorted `cells`, with touching ranges merged.
fn merge_cells<'a>(cells: impl IntoIterator<Item = &'a String>) -> Vec<GeohashInterval> {
    let mut intervals: Vec<GeohashInterval> = Vec::new();
    for cell in cells {
        let next = GeohashInterval::for_cell(cell);
        let absorbed = intervals
            .last_mut()
            .is_some_and(|last| last.try_absorb(&next));
        if !absorbed {
            intervals.push(next);
        }
    }
    intervals
}

/// Upper bound on the cells at `precision` touching `regions`. A span of
/// `k` cell widths touches at most `floor(k) + 2` cells once edge contact is
/// counted.
fn estimate_cells(regions: &[BoundingBox], precision: usize) -> usize {
    let (height, width) = cell_dimensions(precision);
    let total_rows = (180.0 / height).round() as usize;
    let total_cols = (360.0 / width).round() as usize;

    regions
        .iter()
        .map(|r| {
            let rows = ((r.lat_span() / height).floor() as usize + 2).min(total_rows);
            let cols = ((r.lon_span() / width).floor() as usize + 2).min(total_cols);
            rows.saturating_mul(cols)
        })
        .fold(0usize, usize::saturating_add)
}

/// Flood-fill from the center cell over neighbors that intersect a region.
/// The cells touching a rectangle form a connected block of the grid, and
/// wrapped neighbors join the two halves of a region split at ±180°.
fn collect_cells(
    center: &Coordinate,
    regions: &[BoundingBox],
    precision: usize,
) -> Result<BTreeSet<String>> {
    let start = encode(center, precision)?;
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([start]);
    let mut cells = BTreeSet::new();

    while let Some(hash) = queue.pop_front() {
        if !seen.insert(hash.clone()) {
            continue;
        }
        let cell = decode(&hash)?;
        if !regions.iter().any(|r| r.intersects(&cell)) {
            continue;
        }
        for nb in neighbors(&hash)?.iter() {
            if !seen.contains(nb) {
                queue.push_back(nb.to_string());
            }
        }
        cells.insert(hash);
    }

    Ok(cells)
}
