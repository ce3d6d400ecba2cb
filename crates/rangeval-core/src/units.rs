//! Feature units and the per-run attribute table.
//!
//! Units are stored once, in load order, as an arena of rows. Derived
//! attributes live in separate write-once columns indexed by row, so each
//! stage appends its own column and can never overwrite one written earlier.

use std::collections::HashMap;
use std::fmt;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result, Stage};

/// One polygon sub-division of the study area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUnit {
    pub id: String,
    /// Polygon in geographic coordinates (lon/lat degrees).
    pub geometry_geo: MultiPolygon<f64>,
    /// Polygon in the equal-area plane; filled lazily when absent.
    #[serde(default)]
    pub geometry_proj: Option<MultiPolygon<f64>>,
    /// Set by independent prior evidence (e.g. a published range map).
    #[serde(default)]
    pub prior_presence: bool,
}

impl FeatureUnit {
    pub fn new(id: impl Into<String>, geometry_geo: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry_geo,
            geometry_proj: None,
            prior_presence: false,
        }
    }

    pub fn with_prior_presence(mut self, present: bool) -> Self {
        self.prior_presence = present;
        self
    }
}

/// Evidentiary confidence that a unit holds the species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Knowledge {
    Unknown,
    InferredPresent,
    Confirmed,
}

impl Knowledge {
    /// Numeric code written to attribute sinks (0, 1, 2).
    pub fn code(self) -> u8 {
        match self {
            Knowledge::Unknown => 0,
            Knowledge::InferredPresent => 1,
            Knowledge::Confirmed => 2,
        }
    }
}

/// Derived attribute columns, in the order stages write them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    EvidenceCount,
    YearsSinceRecord,
    Knowledge,
    Target,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Column::EvidenceCount => "evidence_count",
            Column::YearsSinceRecord => "years_since_record",
            Column::Knowledge => "knowledge",
            Column::Target => "target",
        };
        f.write_str(name)
    }
}

/// Units of one partition plus their derived attribute columns.
#[derive(Debug, Clone)]
pub struct UnitTable {
    units: Vec<FeatureUnit>,
    index: HashMap<String, usize>,
    evidence_count: Option<Vec<u32>>,
    years_since_record: Option<Vec<Option<i64>>>,
    knowledge: Option<Vec<Knowledge>>,
    target: Option<Vec<Option<bool>>>,
}

impl UnitTable {
    /// Build a table, rejecting duplicate ids.
    pub fn new(units: Vec<FeatureUnit>) -> Result<Self> {
        let mut index = HashMap::with_capacity(units.len());
        for (row, unit) in units.iter().enumerate() {
            if index.insert(unit.id.clone(), row).is_some() {
                return Err(EvalError::DataIntegrity {
                    stage: Stage::Setup,
                    unit_id: unit.id.clone(),
                    detail: "appears more than once in the partition",
                });
            }
        }
        Ok(Self {
            units,
            index,
            evidence_count: None,
            years_since_record: None,
            knowledge: None,
            target: None,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[FeatureUnit] {
        &self.units
    }

    pub(crate) fn units_mut(&mut self) -> &mut [FeatureUnit] {
        &mut self.units
    }

    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&FeatureUnit> {
        self.row_of(id).map(|row| &self.units[row])
    }

    // ── Column readers ──────────────────────────────────────────────────────

    pub fn evidence_count(&self) -> Option<&[u32]> {
        self.evidence_count.as_deref()
    }

    pub fn years_since_record(&self) -> Option<&[Option<i64>]> {
        self.years_since_record.as_deref()
    }

    pub fn knowledge(&self) -> Option<&[Knowledge]> {
        self.knowledge.as_deref()
    }

    pub fn target(&self) -> Option<&[Option<bool>]> {
        self.target.as_deref()
    }

    pub(crate) fn require_evidence_count(&self, stage: Stage) -> Result<&[u32]> {
        self.evidence_count()
            .ok_or(EvalError::MissingColumn { stage, column: Column::EvidenceCount })
    }

    pub(crate) fn require_knowledge(&self, stage: Stage) -> Result<&[Knowledge]> {
        self.knowledge()
            .ok_or(EvalError::MissingColumn { stage, column: Column::Knowledge })
    }

    // ── Column writers (write-once) ─────────────────────────────────────────

    pub(crate) fn write_evidence(
        &mut self,
        stage: Stage,
        counts: Vec<u32>,
        ages: Vec<Option<i64>>,
    ) -> Result<()> {
        if self.evidence_count.is_some() {
            return Err(EvalError::ColumnAlreadyWritten { stage, column: Column::EvidenceCount });
        }
        if self.years_since_record.is_some() {
            return Err(EvalError::ColumnAlreadyWritten { stage, column: Column::YearsSinceRecord });
        }
        debug_assert_eq!(counts.len(), self.units.len());
        debug_assert_eq!(ages.len(), self.units.len());
        self.evidence_count = Some(counts);
        self.years_since_record = Some(ages);
        Ok(())
    }

    pub(crate) fn write_knowledge(&mut self, stage: Stage, knowledge: Vec<Knowledge>) -> Result<()> {
        if self.knowledge.is_some() {
            return Err(EvalError::ColumnAlreadyWritten { stage, column: Column::Knowledge });
        }
        debug_assert_eq!(knowledge.len(), self.units.len());
        self.knowledge = Some(knowledge);
        Ok(())
    }

    pub(crate) fn write_target(&mut self, stage: Stage, target: Vec<Option<bool>>) -> Result<()> {
        if self.target.is_some() {
            return Err(EvalError::ColumnAlreadyWritten { stage, column: Column::Target });
        }
        debug_assert_eq!(target.len(), self.units.len());
        self.target = Some(target);
        Ok(())
    }
}
