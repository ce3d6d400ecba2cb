//! Occurrence records and the run-scoped date filter.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use geo::{Coord, MapCoords, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::geometry::disc;
use crate::projection::Projector;

/// A point observation buffered by its location uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: String,
    pub timestamp: NaiveDate,
    /// Disc in geographic coordinates (lon/lat degrees).
    pub circle_geo: MultiPolygon<f64>,
    /// The same disc in the equal-area plane.
    pub circle_proj: MultiPolygon<f64>,
}

impl Occurrence {
    /// Buffer `point` (lon/lat) by `radius_m` metres in the equal-area plane
    /// and fill both circle geometries.
    pub fn from_point(
        id: impl Into<String>,
        timestamp: NaiveDate,
        point: Point<f64>,
        radius_m: f64,
        projector: &Projector,
        segments: usize,
    ) -> Result<Self, GeometryError> {
        let (cx, cy) = projector.forward(point.x(), point.y())?;
        let circle_proj = disc(cx, cy, radius_m, segments);
        let circle_geo = circle_proj.try_map_coords(|c: Coord<f64>| {
            let (x, y) = projector.inverse(c.x, c.y)?;
            Ok(Coord { x, y })
        })?;
        Ok(Self {
            id: id.into(),
            timestamp,
            circle_geo,
            circle_proj,
        })
    }
}

/// Input row for occurrences that arrive as point + uncertainty radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePoint {
    pub id: String,
    pub timestamp: NaiveDate,
    pub lon: f64,
    pub lat: f64,
    /// Location uncertainty, metres.
    pub radius_m: f64,
}

impl OccurrencePoint {
    pub fn buffer(&self, projector: &Projector, segments: usize) -> Result<Occurrence, GeometryError> {
        Occurrence::from_point(
            self.id.clone(),
            self.timestamp,
            Point::new(self.lon, self.lat),
            self.radius_m,
            projector,
            segments,
        )
    }
}

/// Restricts the working set to selected years and months.
/// An empty set places no restriction on that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceFilter {
    #[serde(default)]
    pub years: BTreeSet<i32>,
    #[serde(default)]
    pub months: BTreeSet<u32>,
}

impl OccurrenceFilter {
    pub fn new(years: impl IntoIterator<Item = i32>, months: impl IntoIterator<Item = u32>) -> Self {
        Self {
            years: years.into_iter().collect(),
            months: months.into_iter().collect(),
        }
    }

    pub fn accepts(&self, date: NaiveDate) -> bool {
        (self.years.is_empty() || self.years.contains(&date.year()))
            && (self.months.is_empty() || self.months.contains(&date.month()))
    }

    pub fn apply(&self, occurrences: &[Occurrence]) -> Vec<Occurrence> {
        occurrences
            .iter()
            .filter(|o| self.accepts(o.timestamp))
            .cloned()
            .collect()
    }
}

/// Parse a comma-separated list such as `"2002, 2004,2019"` or `"11,12,1,2"`.
pub fn parse_list<T: std::str::FromStr>(s: &str) -> Result<Vec<T>, T::Err> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}
