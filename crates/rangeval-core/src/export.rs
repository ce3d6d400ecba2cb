//! Attribute contract handed to exporters.
//!
//! | column               | type        | domain                         |
//! |----------------------|-------------|--------------------------------|
//! | `unit_id`            | string      | unique within the partition    |
//! | `prior_presence`     | bool        |                                |
//! | `evidence_count`     | integer     | ≥ 0                            |
//! | `years_since_record` | integer?    | ≥ 0, null without evidence     |
//! | `knowledge`          | integer     | 0 unknown, 1 inferred, 2 conf. |
//! | `target`             | integer?    | 1, or null when not targeted   |

use std::io::Write;

use geo::MultiPolygon;
use serde::Serialize;

use crate::error::{EvalError, Result, Stage};
use crate::pipeline::Evaluation;
use crate::units::{Column, Knowledge};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRecord {
    pub unit_id: String,
    pub prior_presence: bool,
    pub evidence_count: u32,
    pub years_since_record: Option<i64>,
    pub knowledge: u8,
    pub target: Option<u8>,
}

impl AttributeRecord {
    /// Part of the evaluated view: anything with evidence or inferred presence.
    pub fn is_evaluated(&self) -> bool {
        self.evidence_count > 0 || self.knowledge >= Knowledge::InferredPresent.code()
    }
}

/// Attribute row plus geographic geometry, for feature-file exporters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedFeature {
    #[serde(flatten)]
    pub attributes: AttributeRecord,
    pub geometry: MultiPolygon<f64>,
}

impl Evaluation {
    /// One attribute row per unit, in load order.
    pub fn records(&self) -> Result<Vec<AttributeRecord>> {
        let t = &self.table;
        let missing = |column| EvalError::MissingColumn { stage: Stage::Setup, column };
        let counts = t.evidence_count().ok_or_else(|| missing(Column::EvidenceCount))?;
        let ages = t.years_since_record().ok_or_else(|| missing(Column::YearsSinceRecord))?;
        let knowledge = t.knowledge().ok_or_else(|| missing(Column::Knowledge))?;
        let target = t.target().ok_or_else(|| missing(Column::Target))?;

        Ok(t.units()
            .iter()
            .enumerate()
            .map(|(row, unit)| AttributeRecord {
                unit_id: unit.id.clone(),
                prior_presence: unit.prior_presence,
                evidence_count: counts[row],
                years_since_record: ages[row],
                knowledge: knowledge[row].code(),
                target: target[row].map(u8::from),
            })
            .collect())
    }

    /// Rows restricted to the evaluated view.
    pub fn evaluated_records(&self) -> Result<Vec<AttributeRecord>> {
        Ok(self.records()?.into_iter().filter(AttributeRecord::is_evaluated).collect())
    }

    pub fn features(&self) -> Result<Vec<EvaluatedFeature>> {
        Ok(self
            .records()?
            .into_iter()
            .zip(self.table.units())
            .map(|(attributes, unit)| EvaluatedFeature {
                attributes,
                geometry: unit.geometry_geo.clone(),
            })
            .collect())
    }
}

/// Serialize `rows` as pretty JSON.
pub fn write_json<W: Write, T: Serialize>(writer: W, rows: &T) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, rows)
}
