//! Prior-presence flags from a published range map.
//!
//! Range maps list, per unit, coded presence / origin / reproduction / season
//! values. Only presence code 1 ("known present") marks a unit as holding the
//! species before any occurrence evidence is considered.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::units::UnitTable;

/// Presence code meaning "known present".
pub const PRESENCE_KNOWN: i32 = 1;

/// One row of a species range table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub unit_id: String,
    pub presence_code: i32,
    #[serde(default)]
    pub origin_code: Option<i32>,
    #[serde(default)]
    pub reproduction_code: Option<i32>,
    #[serde(default)]
    pub season_code: Option<i32>,
}

impl RangeRecord {
    pub fn is_known_present(&self) -> bool {
        self.presence_code == PRESENCE_KNOWN
    }
}

/// Outcome of joining range records onto a unit table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeJoin {
    pub flagged: usize,
    /// Range rows whose unit id is absent from the partition.
    pub unmatched: Vec<String>,
}

/// Set `prior_presence` on every unit with a known-present range record.
/// Units without a record keep their current flag.
pub fn apply_range_records(table: &mut UnitTable, records: &[RangeRecord]) -> RangeJoin {
    let mut join = RangeJoin::default();
    for rec in records {
        let Some(row) = table.row_of(&rec.unit_id) else {
            join.unmatched.push(rec.unit_id.clone());
            continue;
        };
        if rec.is_known_present() {
            table.units_mut()[row].prior_presence = true;
            join.flagged += 1;
        }
    }
    if !join.unmatched.is_empty() {
        warn!(
            unmatched = join.unmatched.len(),
            first = %join.unmatched[0],
            "range records reference units outside the partition"
        );
    }
    info!(flagged = join.flagged, records = records.len(), "applied range records");
    join
}
