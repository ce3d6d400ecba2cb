//! Knowledge classification.
//!
//! Precedence (later rules override earlier ones):
//! 1. every unit starts `Unknown`;
//! 2. a unit whose interior overlaps the presence mask becomes
//!    `InferredPresent` (sharing only a boundary does not count);
//! 3. a unit with `evidence_count >= min_evidence_count` becomes `Confirmed`.

use std::collections::BTreeSet;

use geo::MultiPolygon;
use tracing::{info, warn};

use crate::error::{Result, Stage};
use crate::geometry::GeometryAdapter;
use crate::units::{FeatureUnit, Knowledge, UnitTable};

/// Union of the geometries of `units`. Units whose geometry the backend
/// rejects are left out and returned by id.
pub(crate) fn union_of<'a, A: GeometryAdapter + ?Sized>(
    adapter: &A,
    units: impl IntoIterator<Item = &'a FeatureUnit>,
) -> (MultiPolygon<f64>, Vec<String>) {
    let mut mask = MultiPolygon::new(Vec::new());
    let mut failed = Vec::new();
    for unit in units {
        match adapter.union(&[&mask, &unit.geometry_geo]) {
            Ok(m) => mask = m,
            Err(e) => {
                warn!(unit = %unit.id, error = %e, "leaving unit out of mask");
                failed.push(unit.id.clone());
            }
        }
    }
    (mask, failed)
}

/// Union of all units flagged present by prior evidence.
pub fn presence_mask<A: GeometryAdapter + ?Sized>(adapter: &A, table: &UnitTable) -> (MultiPolygon<f64>, Vec<String>) {
    union_of(adapter, table.units().iter().filter(|u| u.prior_presence))
}

/// Knowledge level of a single unit. Rules are applied in precedence order.
pub fn knowledge_level(in_presence: bool, evidence_count: u32, min_evidence_count: u32) -> Knowledge {
    let mut level = Knowledge::Unknown;
    if in_presence {
        level = Knowledge::InferredPresent;
    }
    if evidence_count >= min_evidence_count {
        level = Knowledge::Confirmed;
    }
    level
}

/// Write the `knowledge` column. Returns units whose predicate failed (they
/// are classified as if they did not overlap the mask).
pub fn classify<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    table: &mut UnitTable,
    presence: &MultiPolygon<f64>,
    min_evidence_count: u32,
) -> Result<BTreeSet<String>> {
    let counts = table.require_evidence_count(Stage::Classification)?;
    let mut degraded = BTreeSet::new();

    let knowledge: Vec<Knowledge> = table
        .units()
        .iter()
        .zip(counts)
        .map(|(unit, &count)| {
            let in_presence = adapter
                .strictly_overlaps(&unit.geometry_geo, presence)
                .unwrap_or_else(|e| {
                    warn!(unit = %unit.id, error = %e, "presence-mask test failed");
                    degraded.insert(unit.id.clone());
                    false
                });
            knowledge_level(in_presence, count, min_evidence_count)
        })
        .collect();

    let confirmed = knowledge.iter().filter(|k| **k == Knowledge::Confirmed).count();
    let inferred = knowledge.iter().filter(|k| **k == Knowledge::InferredPresent).count();
    table.write_knowledge(Stage::Classification, knowledge)?;
    info!(confirmed, inferred, "knowledge classification complete");
    Ok(degraded)
}
