//! Sampling-target selection.
//!
//! Rules run in order; each may set or clear the flag:
//! 1. `target = None` (not evaluated for targeting);
//! 2. `Some(true)` if the unit is boundary-adjacent to the confirmed mask, or
//!    its evidence count is below `min_evidence_count`;
//! 3. `Some(true)` if the unit's interior overlaps the presence mask;
//! 4. `None` if the unit is confirmed. This rule always wins.
//!
//! Rule 2 uses "touches" and rule 3 uses "overlaps but does not touch". The
//! two predicates are not interchangeable.

use std::collections::BTreeSet;

use geo::MultiPolygon;
use tracing::{info, warn};

use crate::classify::union_of;
use crate::error::{GeometryError, Result, Stage};
use crate::geometry::GeometryAdapter;
use crate::units::{Knowledge, UnitTable};

/// Spatial facts about one unit that the targeting rules consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInputs {
    pub adjacent_to_confirmed: bool,
    pub overlaps_presence: bool,
    pub evidence_count: u32,
    pub knowledge: Knowledge,
}

/// Apply the four targeting rules in order.
pub fn target_flag(inputs: TargetInputs, min_evidence_count: u32) -> Option<bool> {
    let mut target = None;
    if inputs.adjacent_to_confirmed || inputs.evidence_count < min_evidence_count {
        target = Some(true);
    }
    if inputs.overlaps_presence {
        target = Some(true);
    }
    if inputs.knowledge == Knowledge::Confirmed {
        target = None;
    }
    target
}

/// Union of all units classified as confirmed.
pub fn confirmed_mask<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    table: &UnitTable,
) -> Result<(MultiPolygon<f64>, Vec<String>)> {
    let knowledge = table.require_knowledge(Stage::Targeting)?;
    let confirmed = table
        .units()
        .iter()
        .zip(knowledge)
        .filter(|(_, k)| **k == Knowledge::Confirmed)
        .map(|(u, _)| u);
    Ok(union_of(adapter, confirmed))
}

/// Write the `target` column. Returns units whose predicates failed; a failed
/// predicate is treated as false.
pub fn select_targets<A: GeometryAdapter + ?Sized>(
    adapter: &A,
    table: &mut UnitTable,
    presence: &MultiPolygon<f64>,
    min_evidence_count: u32,
) -> Result<BTreeSet<String>> {
    let (confirmed, failed) = confirmed_mask(adapter, table)?;
    let counts = table.require_evidence_count(Stage::Targeting)?;
    let knowledge = table.require_knowledge(Stage::Targeting)?;

    let mut degraded: BTreeSet<String> = failed.into_iter().collect();
    let mut check = |unit_id: &str, what: &str, r: std::result::Result<bool, GeometryError>| {
        r.unwrap_or_else(|e| {
            warn!(unit = %unit_id, test = what, error = %e, "targeting predicate failed");
            degraded.insert(unit_id.to_string());
            false
        })
    };

    let targets: Vec<Option<bool>> = table
        .units()
        .iter()
        .zip(counts.iter().zip(knowledge))
        .map(|(unit, (&evidence_count, &knowledge))| {
            let inputs = TargetInputs {
                adjacent_to_confirmed: check(
                    &unit.id,
                    "boundary_adjacent",
                    adapter.boundary_adjacent(&unit.geometry_geo, &confirmed),
                ),
                overlaps_presence: check(
                    &unit.id,
                    "strictly_overlaps",
                    adapter.strictly_overlaps(&unit.geometry_geo, presence),
                ),
                evidence_count,
                knowledge,
            };
            target_flag(inputs, min_evidence_count)
        })
        .collect();

    let targeted = targets.iter().filter(|t| **t == Some(true)).count();
    table.write_target(Stage::Targeting, targets)?;
    info!(targeted, "target selection complete");
    Ok(degraded)
}
