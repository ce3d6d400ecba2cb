//! Per-unit reduction of the attribution set: evidence count and the age of
//! the most recent qualifying occurrence.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::info;

use crate::attribution::Attribution;
use crate::config::AgeUnit;
use crate::error::{EvalError, Result, Stage};
use crate::units::UnitTable;

/// Write `evidence_count` and `years_since_record` onto `table`.
///
/// Units absent from `attributions` get count 0 and no age. An attribution
/// naming a unit that is not in the table is an integrity error.
///
/// Returns the number of units with at least one attributed occurrence.
pub fn aggregate(
    table: &mut UnitTable,
    attributions: &[Attribution],
    reference_date: NaiveDate,
    age_unit: AgeUnit,
) -> Result<usize> {
    let n = table.len();
    let mut seen: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); n];
    let mut ages: Vec<Option<i64>> = vec![None; n];

    for a in attributions {
        let row = table
            .row_of(&a.unit_id)
            .ok_or_else(|| EvalError::unknown_unit(Stage::Aggregation, a.unit_id.as_str()))?;
        seen[row].insert(a.occurrence_id.as_str());

        let age = age_unit.age(reference_date, a.occurrence_timestamp);
        ages[row] = Some(ages[row].map_or(age, |cur| cur.min(age)));
    }

    let counts: Vec<u32> = seen.iter().map(|s| s.len() as u32).collect();
    let with_evidence = counts.iter().filter(|&&c| c > 0).count();

    table.write_evidence(Stage::Aggregation, counts, ages)?;
    info!(units = n, with_evidence, "unit aggregation complete");
    Ok(with_evidence)
}
