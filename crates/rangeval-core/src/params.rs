//! Per-species evaluation parameters and the partition kinds they apply to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Which partition of the study area a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    /// 12-digit hydrologic units.
    Hucs,
    /// Atlas survey blocks.
    Blocks,
    Counties,
}

impl PartitionKind {
    /// Identifier column in the source layer.
    pub fn id_column(self) -> &'static str {
        match self {
            PartitionKind::Hucs => "HUC12RNG",
            PartitionKind::Blocks => "BLOCK_QUAD",
            PartitionKind::Counties => "OBJECTID",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PartitionKind::Hucs => "hucs",
            PartitionKind::Blocks => "blocks",
            PartitionKind::Counties => "counties",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PartitionKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hucs" | "huc" | "nchucs" => Ok(PartitionKind::Hucs),
            "blocks" | "block" | "ncblocks" | "ncbablocks" => Ok(PartitionKind::Blocks),
            "counties" | "county" | "nccounties" => Ok(PartitionKind::Counties),
            other => Err(EvalError::Configuration(format!("unknown partition `{other}`"))),
        }
    }
}

/// Thresholds for one (evaluation, species, partition) triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParameters {
    /// Minimum share of an occurrence circle, in percent, that must fall
    /// inside a unit for the occurrence to count there. Inclusive.
    pub min_overlap_fraction: f64,
    /// Evidence count at which a unit becomes confirmed.
    pub min_evidence_count: u32,
}

impl EvaluationParameters {
    pub fn new(min_overlap_fraction: f64, min_evidence_count: u32) -> Result<Self> {
        let p = Self { min_overlap_fraction, min_evidence_count };
        p.validate()?;
        Ok(p)
    }

    /// Threshold expressed as the percentage of the circle allowed to fall
    /// outside the unit.
    pub fn from_error_tolerance(error_tolerance: f64, min_evidence_count: u32) -> Result<Self> {
        if !(0.0..=100.0).contains(&error_tolerance) {
            return Err(EvalError::Configuration(format!(
                "error tolerance {error_tolerance} is outside [0, 100]"
            )));
        }
        Self::new(100.0 - error_tolerance, min_evidence_count)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.min_overlap_fraction) {
            return Err(EvalError::Configuration(format!(
                "min_overlap_fraction {} is outside [0, 100]",
                self.min_overlap_fraction
            )));
        }
        if self.min_evidence_count == 0 {
            return Err(EvalError::Configuration("min_evidence_count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Threshold as stored in a parameter row: either form is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverlapThreshold {
    MinOverlap { min_overlap_fraction: f64 },
    ErrorTolerance { error_tolerance: f64 },
}

/// One stored parameter row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub evaluation_id: String,
    pub species_id: String,
    pub partition: PartitionKind,
    #[serde(flatten)]
    pub threshold: OverlapThreshold,
    pub min_count: u32,
}

impl ParameterRow {
    pub fn resolve(&self) -> Result<EvaluationParameters> {
        match self.threshold {
            OverlapThreshold::MinOverlap { min_overlap_fraction } => {
                EvaluationParameters::new(min_overlap_fraction, self.min_count)
            }
            OverlapThreshold::ErrorTolerance { error_tolerance } => {
                EvaluationParameters::from_error_tolerance(error_tolerance, self.min_count)
            }
        }
    }
}

/// All stored parameter rows, looked up by evaluation, species and partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    pub rows: Vec<ParameterRow>,
}

impl ParameterTable {
    pub fn new(rows: Vec<ParameterRow>) -> Self {
        Self { rows }
    }

    /// Resolve parameters for a run. A missing row is fatal.
    pub fn get(&self, evaluation_id: &str, species_id: &str, partition: PartitionKind) -> Result<EvaluationParameters> {
        let mut matches = self
            .rows
            .iter()
            .filter(|r| r.evaluation_id == evaluation_id && r.species_id == species_id && r.partition == partition);

        let row = matches.next().ok_or_else(|| {
            EvalError::Configuration(format!(
                "no evaluation parameters for evaluation `{evaluation_id}`, species `{species_id}`, partition `{partition}`"
            ))
        })?;
        if matches.next().is_some() {
            return Err(EvalError::Configuration(format!(
                "more than one parameter row for evaluation `{evaluation_id}`, species `{species_id}`, partition `{partition}`"
            )));
        }
        row.resolve()
    }
}
