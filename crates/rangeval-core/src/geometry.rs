//! Geometry adapter: the single seam between the evaluation stages and the
//! polygon backend (`geo`).
//!
//! The stages never call `geo` directly. They go through [`GeometryAdapter`],
//! which validates inputs, converts backend panics into [`GeometryError`]s,
//! and reprojects into the configured equal-area plane.
//!
//! Two spatial predicates drive classification and targeting and are easy to
//! confuse, so they are named separately:
//!
//! * [`GeometryAdapter::strictly_overlaps`]: interiors meet (intersects and
//!   does not merely touch).
//! * [`GeometryAdapter::boundary_adjacent`]: boundaries meet, interiors do not
//!   (DE-9IM "touches").

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{
    Area, BooleanOps, BoundingRect, Coord, Intersects, LineString, MapCoords, MultiPolygon,
    Polygon, Rect, Relate,
};

use crate::error::GeometryError;
use crate::projection::{EqualArea, Projector};

/// Polygon operations the evaluation stages rely on.
pub trait GeometryAdapter: Send + Sync {
    /// True when the two geometries share at least one point.
    fn intersects(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError>;

    /// True when the boundaries meet but the interiors do not.
    fn touches(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError>;

    fn intersection(
        &self,
        a: &MultiPolygon<f64>,
        b: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, GeometryError>;

    /// Unsigned planar area in the geometry's own units.
    fn area(&self, g: &MultiPolygon<f64>) -> f64;

    fn union(&self, geoms: &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>, GeometryError>;

    /// Geographic (lon/lat degrees) → equal-area plane.
    fn to_equal_area(&self, g: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError>;

    /// Equal-area plane → geographic (lon/lat degrees).
    fn to_geographic(&self, g: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError>;

    /// Interiors overlap: intersects and does not merely touch.
    fn strictly_overlaps(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError> {
        Ok(self.intersects(a, b)? && !self.touches(a, b)?)
    }

    /// Boundaries meet without interior overlap.
    fn boundary_adjacent(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError> {
        self.touches(a, b)
    }
}

/// [`GeometryAdapter`] backed by the `geo` crate.
#[derive(Debug, Clone, Copy)]
pub struct GeoAdapter {
    projector: Projector,
}

impl GeoAdapter {
    pub fn new(equal_area: EqualArea) -> Self {
        Self { projector: equal_area.projector() }
    }

    pub fn projector(&self) -> Projector {
        self.projector
    }
}

impl Default for GeoAdapter {
    fn default() -> Self {
        Self::new(EqualArea::default())
    }
}

impl GeometryAdapter for GeoAdapter {
    fn intersects(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError> {
        validate(a)?;
        validate(b)?;
        if a.0.is_empty() || b.0.is_empty() {
            return Ok(false);
        }
        guarded("intersects", || a.intersects(b))
    }

    fn touches(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<bool, GeometryError> {
        validate(a)?;
        validate(b)?;
        if a.0.is_empty() || b.0.is_empty() {
            return Ok(false);
        }
        guarded("relate", || a.relate(b).is_touches())
    }

    fn intersection(
        &self,
        a: &MultiPolygon<f64>,
        b: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        validate(a)?;
        validate(b)?;
        guarded("intersection", || a.intersection(b))
    }

    fn area(&self, g: &MultiPolygon<f64>) -> f64 {
        g.unsigned_area()
    }

    fn union(&self, geoms: &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>, GeometryError> {
        let mut acc = MultiPolygon::new(Vec::new());
        for g in geoms {
            validate(g)?;
            if g.0.is_empty() {
                continue;
            }
            acc = if acc.0.is_empty() {
                (*g).clone()
            } else {
                guarded("union", || acc.union(g))?
            };
        }
        Ok(acc)
    }

    fn to_equal_area(&self, g: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
        let projector = self.projector;
        g.try_map_coords(|c: Coord<f64>| {
            let (x, y) = projector.forward(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }

    fn to_geographic(&self, g: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
        let projector = self.projector;
        g.try_map_coords(|c: Coord<f64>| {
            let (x, y) = projector.inverse(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

/// Reject inputs the boolean-ops backend cannot handle.
pub fn validate(g: &MultiPolygon<f64>) -> Result<(), GeometryError> {
    for poly in &g.0 {
        validate_ring(poly.exterior())?;
        for ring in poly.interiors() {
            validate_ring(ring)?;
        }
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>) -> Result<(), GeometryError> {
    if let Some(c) = ring.0.iter().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::NonFinite { x: c.x, y: c.y });
    }
    if ring.0.len() < 4 {
        return Err(GeometryError::DegenerateRing { coords: ring.0.len() });
    }
    Ok(())
}

/// Run a backend call, converting a panic into a recoverable error.
fn guarded<T>(op: &'static str, f: impl FnOnce() -> T) -> Result<T, GeometryError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|_| GeometryError::BackendPanic { op })
}

/// Cheap rejection test on bounding rectangles. `None` rects never meet.
pub fn bboxes_meet(a: Option<Rect<f64>>, b: Option<Rect<f64>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
        }
        _ => false,
    }
}

/// Bounding rectangle of a multipolygon, `None` when empty.
pub fn bbox(g: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    g.bounding_rect()
}

/// Axis-aligned rectangle as a one-part multipolygon. Handy for grid partitions.
pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }).to_polygon()])
}

/// Regular `segments`-gon approximating a disc, counter-clockwise and closed.
pub fn disc(cx: f64, cy: f64, radius: f64, segments: usize) -> MultiPolygon<f64> {
    let segments = segments.max(8);
    let step = std::f64::consts::TAU / segments as f64;
    let ring: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            let t = i as f64 * step;
            Coord { x: cx + radius * t.cos(), y: cy + radius * t.sin() }
        })
        .collect();
    MultiPolygon::new(vec![Polygon::new(LineString::from(ring), Vec::new())])
}
