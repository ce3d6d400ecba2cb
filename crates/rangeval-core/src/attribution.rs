//! Evidence attribution: which occurrences count toward which units.
//!
//! Every unit × occurrence pair whose geographic geometries intersect is
//! clipped, the clip is reprojected into the equal-area plane, and its area is
//! compared against the occurrence circle's equal-area area:
//!
//! ```text
//! overlap_fraction = 100 × area(clip_proj) / area(circle_proj)
//! ```
//!
//! A pair is kept when `overlap_fraction >= min_overlap_fraction`. Pairs whose
//! geometry cannot be processed are skipped and reported, never fatal.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use geo::{MultiPolygon, Rect};
use serde::Serialize;
use tracing::{debug, info, warn};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::config::AttributionPolicy;
use crate::error::GeometryError;
use crate::geometry::{bbox, bboxes_meet, validate, GeometryAdapter};
use crate::occurrence::Occurrence;
use crate::units::{FeatureUnit, UnitTable};

/// One occurrence counted toward one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub unit_id: String,
    pub occurrence_id: String,
    pub occurrence_timestamp: NaiveDate,
    /// Percent of the occurrence circle inside the unit.
    pub overlap_fraction: f64,
}

/// A pair dropped because the geometry backend rejected it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPair {
    pub unit_id: String,
    pub occurrence_id: String,
    #[serde(serialize_with = "display")]
    pub error: GeometryError,
}

fn display<S: serde::Serializer>(e: &GeometryError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributionSet {
    /// Kept pairs, in unit order then occurrence order.
    pub attributions: Vec<Attribution>,
    pub skipped: Vec<SkippedPair>,
    /// Pairs whose geographic geometries intersect.
    pub intersecting_pairs: usize,
}

impl AttributionSet {
    /// Units that lost at least one pair to a geometry failure.
    pub fn degraded_units(&self) -> BTreeSet<String> {
        self.skipped.iter().map(|s| s.unit_id.clone()).collect()
    }
}

/// Slack, in percentage points, on the inclusive threshold test. A clip is
/// re-noded by the boolean op and reprojected, so a fully contained circle
/// can measure a few ULPs under 100.
pub const OVERLAP_TOLERANCE: f64 = 1e-9 * 100.0;

/// Percentage of `circle_area` covered by `clip_area`, clamped to [0, 100].
/// A degenerate (zero, negative or non-finite) denominator yields 0.
pub fn overlap_fraction(clip_area: f64, circle_area: f64) -> f64 {
    if !circle_area.is_finite() || circle_area <= 0.0 || !clip_area.is_finite() {
        return 0.0;
    }
    (100.0 * clip_area / circle_area).clamp(0.0, 100.0)
}

/// Inclusive threshold test, within [`OVERLAP_TOLERANCE`].
#[inline]
pub fn sufficient_overlap(fraction: f64, min_overlap_fraction: f64) -> bool {
    fraction + OVERLAP_TOLERANCE >= min_overlap_fraction
}

struct PreparedOccurrence<'a> {
    occ: &'a Occurrence,
    bbox: Option<Rect<f64>>,
    /// Equal-area circle area, or why the circle is unusable.
    proj_area: Result<f64, GeometryError>,
}

/// A circle with no polygons is a null geometry, not a zero-area one.
fn usable_circle(occ: &Occurrence) -> Result<(), GeometryError> {
    if occ.circle_geo.0.is_empty() || occ.circle_proj.0.is_empty() {
        return Err(GeometryError::Empty);
    }
    validate(&occ.circle_proj)?;
    validate(&occ.circle_geo)
}

enum PairOutcome {
    Disjoint,
    Rejected,
    Kept(Attribution),
    Failed(SkippedPair),
}

/// Attribute `occurrences` to the units of `table`.
pub fn attribute<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    table: &UnitTable,
    occurrences: &[Occurrence],
    min_overlap_fraction: f64,
    policy: AttributionPolicy,
    bbox_prefilter: bool,
) -> AttributionSet {
    let prepared: Vec<PreparedOccurrence<'_>> = occurrences
        .iter()
        .map(|occ| PreparedOccurrence {
            occ,
            bbox: bbox(&occ.circle_geo),
            proj_area: usable_circle(occ).map(|_| adapter.area(&occ.circle_proj)),
        })
        .collect();

    let per_unit = |unit: &FeatureUnit| -> Vec<PairOutcome> {
        let unit_bbox = bbox(&unit.geometry_geo);
        // Zero-area units cannot hold any share of a circle. The equal-area
        // polygon is authoritative when the unit has one.
        if adapter.area(unit.geometry_proj.as_ref().unwrap_or(&unit.geometry_geo)) <= 0.0 {
            return Vec::new();
        }
        prepared
            .iter()
            .map(|p| match p.proj_area {
                Err(ref e) => PairOutcome::Failed(SkippedPair {
                    unit_id: unit.id.clone(),
                    occurrence_id: p.occ.id.clone(),
                    error: e.clone(),
                }),
                // Zero-area circles are dropped whatever the threshold.
                Ok(area) if !(area > 0.0) => PairOutcome::Disjoint,
                Ok(area) => {
                    if bbox_prefilter && !bboxes_meet(unit_bbox, p.bbox) {
                        return PairOutcome::Disjoint;
                    }
                    evaluate_pair(adapter, unit, p.occ, area, min_overlap_fraction)
                }
            })
            .collect()
    };

    #[cfg(feature = "threading")]
    let outcomes: Vec<Vec<PairOutcome>> = table.units().par_iter().map(per_unit).collect();
    #[cfg(not(feature = "threading"))]
    let outcomes: Vec<Vec<PairOutcome>> = table.units().iter().map(per_unit).collect();

    let mut set = AttributionSet::default();
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            PairOutcome::Disjoint => {}
            PairOutcome::Rejected => set.intersecting_pairs += 1,
            PairOutcome::Kept(a) => {
                set.intersecting_pairs += 1;
                set.attributions.push(a);
            }
            PairOutcome::Failed(s) => {
                warn!(unit = %s.unit_id, occurrence = %s.occurrence_id, error = %s.error, "skipping geometry pair");
                set.skipped.push(s);
            }
        }
    }

    if policy == AttributionPolicy::BestOverlap {
        set.attributions = keep_best_overlap(set.attributions);
    }

    info!(
        units = table.len(),
        occurrences = occurrences.len(),
        intersecting = set.intersecting_pairs,
        attributed = set.attributions.len(),
        skipped = set.skipped.len(),
        "evidence attribution complete"
    );
    set
}

fn evaluate_pair<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    unit: &FeatureUnit,
    occ: &Occurrence,
    circle_area: f64,
    min_overlap_fraction: f64,
) -> PairOutcome {
    let fail = |error: GeometryError| {
        PairOutcome::Failed(SkippedPair {
            unit_id: unit.id.clone(),
            occurrence_id: occ.id.clone(),
            error,
        })
    };

    match adapter.intersects(&unit.geometry_geo, &occ.circle_geo) {
        Ok(true) => {}
        Ok(false) => return PairOutcome::Disjoint,
        Err(e) => return fail(e),
    }

    let clip_area = match clip_area_proj(adapter, &unit.geometry_geo, &occ.circle_geo) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let fraction = overlap_fraction(clip_area, circle_area);
    debug!(unit = %unit.id, occurrence = %occ.id, fraction, "overlap");

    if sufficient_overlap(fraction, min_overlap_fraction) {
        PairOutcome::Kept(Attribution {
            unit_id: unit.id.clone(),
            occurrence_id: occ.id.clone(),
            occurrence_timestamp: occ.timestamp,
            overlap_fraction: fraction,
        })
    } else {
        PairOutcome::Rejected
    }
}

fn clip_area_proj<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    unit: &MultiPolygon<f64>,
    circle: &MultiPolygon<f64>,
) -> Result<f64, GeometryError> {
    let clip = adapter.intersection(unit, circle)?;
    let clip_proj = adapter.to_equal_area(&clip)?;
    Ok(adapter.area(&clip_proj))
}

/// Keep, per occurrence, only the attribution with the largest fraction.
/// Ties go to the lexicographically smallest unit id.
fn keep_best_overlap(attributions: Vec<Attribution>) -> Vec<Attribution> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (i, a) in attributions.iter().enumerate() {
        best.entry(a.occurrence_id.as_str())
            .and_modify(|j| {
                let cur = &attributions[*j];
                if a.overlap_fraction > cur.overlap_fraction
                    || (a.overlap_fraction == cur.overlap_fraction && a.unit_id < cur.unit_id)
                {
                    *j = i;
                }
            })
            .or_insert(i);
    }
    let winners: BTreeSet<usize> = best.into_values().collect();
    attributions
        .into_iter()
        .enumerate()
        .filter(|(i, _)| winners.contains(i))
        .map(|(_, a)| a)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{rect, GeoAdapter};
    use crate::projection::EqualArea;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 4, 1).unwrap()
    }

    fn occ(id: &str, circle: MultiPolygon<f64>) -> Occurrence {
        Occurrence {
            id: id.into(),
            timestamp: date(),
            circle_proj: circle.clone(),
            circle_geo: circle,
        }
    }

    fn run(table: &UnitTable, occs: &[Occurrence], tau: f64, policy: AttributionPolicy) -> AttributionSet {
        attribute(&GeoAdapter::new(EqualArea::Planar), table, occs, tau, policy, true)
    }

    fn two_units() -> UnitTable {
        UnitTable::new(vec![
            FeatureUnit::new("a", rect(0.0, 0.0, 10.0, 10.0)),
            FeatureUnit::new("b", rect(10.0, 0.0, 20.0, 10.0)),
        ])
        .unwrap()
    }

    #[test]
    fn fraction_with_zero_denominator_is_zero() {
        assert_eq!(overlap_fraction(5.0, 0.0), 0.0);
        assert_eq!(overlap_fraction(5.0, f64::NAN), 0.0);
        assert_eq!(overlap_fraction(25.0, 100.0), 25.0);
        assert_eq!(overlap_fraction(100.0 + 1e-12, 100.0), 100.0);
    }

    #[test]
    fn rounding_noise_under_threshold_still_counts() {
        let just_under = 100.0 - 4.0 * f64::EPSILON * 100.0;
        assert!(sufficient_overlap(just_under, 100.0));
        assert!(sufficient_overlap(50.0, 50.0));
        assert!(!sufficient_overlap(49.999_999, 50.0));
    }

    #[test]
    fn threshold_is_inclusive() {
        let table = two_units();
        // Square "circle" split exactly 50/50 between a and b.
        let occs = [occ("o1", rect(5.0, 0.0, 15.0, 10.0))];
        let at = run(&table, &occs, 50.0, AttributionPolicy::EveryQualifying);
        assert_eq!(at.attributions.len(), 2);
        assert!(at.attributions.iter().all(|a| a.overlap_fraction == 50.0));

        let above = run(&table, &occs, 50.000_001, AttributionPolicy::EveryQualifying);
        assert!(above.attributions.is_empty());
        assert_eq!(above.intersecting_pairs, 2);
    }

    #[test]
    fn straddling_occurrence_counts_in_both_units() {
        let table = two_units();
        let occs = [occ("o1", rect(6.0, 0.0, 14.0, 10.0))];
        let at = run(&table, &occs, 40.0, AttributionPolicy::EveryQualifying);
        let units: Vec<&str> = at.attributions.iter().map(|a| a.unit_id.as_str()).collect();
        assert_eq!(units, vec!["a", "b"]);
    }

    #[test]
    fn best_overlap_policy_keeps_one_unit() {
        let table = two_units();
        let occs = [occ("o1", rect(4.0, 0.0, 14.0, 10.0)), occ("o2", rect(5.0, 0.0, 15.0, 10.0))];
        let at = run(&table, &occs, 10.0, AttributionPolicy::BestOverlap);
        assert_eq!(at.attributions.len(), 2);
        // o1 is 60% in a; o2 ties 50/50 and goes to the smaller id.
        assert!(at.attributions.iter().all(|a| a.unit_id == "a"));
    }

    #[test]
    fn degenerate_circle_is_dropped_without_error() {
        let table = two_units();
        let flat = rect(2.0, 2.0, 2.0, 8.0);
        let occs = [occ("o1", flat)];
        let at = run(&table, &occs, 0.0, AttributionPolicy::EveryQualifying);
        assert!(at.attributions.is_empty());
        assert!(at.skipped.is_empty());
    }

    #[test]
    fn malformed_pair_is_skipped_and_reported() {
        let table = two_units();
        let bad = rect(1.0, 1.0, f64::NAN, 3.0);
        let good = rect(1.0, 1.0, 3.0, 3.0);
        let occs = [occ("bad", bad), occ("good", good)];
        let at = attribute(
            &GeoAdapter::new(EqualArea::Planar),
            &table,
            &occs,
            50.0,
            AttributionPolicy::EveryQualifying,
            false,
        );
        assert_eq!(at.attributions.len(), 1);
        assert_eq!(at.attributions[0].occurrence_id, "good");
        assert!(!at.skipped.is_empty());
        assert!(at.skipped.iter().all(|s| s.occurrence_id == "bad"));
        assert!(at.degraded_units().contains("a"));
    }

    #[test]
    fn null_circle_is_reported_per_unit() {
        let table = two_units();
        let occs = [occ("null", MultiPolygon::new(Vec::new()))];
        let at = run(&table, &occs, 50.0, AttributionPolicy::EveryQualifying);
        assert!(at.attributions.is_empty());
        assert_eq!(at.skipped.len(), 2);
        assert!(at.skipped.iter().all(|s| s.error == GeometryError::Empty));
    }

    #[test]
    fn unit_flat_in_the_equal_area_plane_is_dropped() {
        let mut sliver = FeatureUnit::new("s", rect(0.0, 0.0, 10.0, 10.0));
        sliver.geometry_proj = Some(rect(0.0, 0.0, 0.0, 10.0));
        let table = UnitTable::new(vec![sliver, FeatureUnit::new("b", rect(10.0, 0.0, 20.0, 10.0))]).unwrap();
        let occs = [occ("o1", rect(1.0, 1.0, 3.0, 3.0))];
        let at = run(&table, &occs, 50.0, AttributionPolicy::EveryQualifying);
        assert!(at.attributions.is_empty());
        assert_eq!(at.intersecting_pairs, 0);
    }

    #[test]
    fn unit_without_evidence_produces_no_rows() {
        let table = two_units();
        let occs = [occ("o1", rect(1.0, 1.0, 3.0, 3.0))];
        let at = run(&table, &occs, 50.0, AttributionPolicy::EveryQualifying);
        assert!(at.attributions.iter().all(|a| a.unit_id != "b"));
    }
}
